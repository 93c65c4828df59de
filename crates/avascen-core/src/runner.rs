//! Per-scenario execution with failure isolation.
//!
//! Scenarios run independently against the shared read-only table and
//! legend. One failing or empty scenario never affects its siblings;
//! surviving results keep the input scenario order and their criteria,
//! so downstream naming stays aligned even when scenarios drop out.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info, warn};

use crate::criteria::ScenarioCriteria;
use crate::events::StageEvent;
use crate::filter::filter_scenario;
use crate::legend::Legend;
use crate::row::GeometryRole;
use crate::table::ResultTable;

/// One surviving scenario: its identity, its filtered table and the
/// event stream its cascade produced.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub criteria: ScenarioCriteria,
    pub table: ResultTable,
    pub events: Vec<StageEvent>,
}

/// Evaluate the cascade once per scenario. Failing scenarios are
/// logged and skipped; empty ones are logged and excluded.
pub fn run_scenarios(
    table: &ResultTable,
    criteria: &[ScenarioCriteria],
    legend: &Legend,
) -> Vec<ScenarioResult> {
    let mut results = Vec::new();
    for crit in criteria {
        info!("starting scenario: {}", crit.name);
        let outcome = catch_unwind(AssertUnwindSafe(|| filter_scenario(table, crit, legend)));
        match outcome {
            Err(_) => {
                error!("scenario {} failed during filtering; skipping", crit.name);
            }
            Ok(filtered) if filtered.table.is_empty() => {
                warn!("scenario {} produced no results", crit.name);
            }
            Ok(filtered) => {
                log_summary(&filtered.table, &crit.name);
                results.push(ScenarioResult {
                    criteria: crit.clone(),
                    table: filtered.table,
                    events: filtered.events,
                });
            }
        }
    }
    results
}

/// Row-wise union of all per-scenario results. The coordinate
/// reference is inherited from the first scenario.
pub fn master_table(results: &[ScenarioResult]) -> Option<ResultTable> {
    let first = results.first()?;
    let mut columns = first.table.columns.clone();
    let mut rows = Vec::new();
    for result in results {
        columns.extend_from(&result.table.columns);
        rows.extend(result.table.rows.iter().cloned());
    }
    Some(ResultTable {
        columns,
        rows,
        crs: first.table.crs.clone(),
    })
}

/// Quick result-count summary for one scenario.
pub fn log_summary(table: &ResultTable, name: &str) {
    let res = table
        .rows
        .iter()
        .filter(|r| r.geometry_role == Some(GeometryRole::Res))
        .count();
    let rel = table
        .rows
        .iter()
        .filter(|r| r.geometry_role == Some(GeometryRole::Rel))
        .count();
    let unique: std::collections::HashSet<&str> = table
        .rows
        .iter()
        .filter_map(|r| r.release_area_id.as_deref())
        .collect();
    info!(
        "scenario {name}: total={} (res={res}, rel={rel}), unique release areas={}",
        table.len(),
        unique.len()
    );
}
