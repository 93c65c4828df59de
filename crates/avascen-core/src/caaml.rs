//! Forecast-feed (CAAML v6) import stub.
//!
//! Reserved integration point for deriving scenario definitions from
//! published avalanche forecasts. Deliberately a no-op until the feed
//! format is settled.

use std::path::Path;

use tracing::info;

use crate::criteria::ScenarioSpec;

/// Would parse a CAAML v6 document into scenario definitions.
/// Currently logs the request and returns nothing.
pub fn parse_caaml_to_specs(source: &Path) -> Vec<ScenarioSpec> {
    info!(
        "CAAML import not yet implemented; source requested: {}",
        source.display()
    );
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_returns_no_specs() {
        assert!(parse_caaml_to_specs(Path::new("forecast.json")).is_empty());
    }
}
