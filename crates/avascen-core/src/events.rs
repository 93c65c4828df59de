//! Structured per-stage events emitted by the filter cascade.
//!
//! Each stage records what it did and how many rows survived, so the
//! pipeline has no process-wide side effects and tests can assert on
//! the stream directly instead of scraping log output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Filter cascade stages, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Region,
    Subcatchment,
    Sector,
    Flow,
    ElevMin,
    ElevMax,
    LegendJoin,
    Dedup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Region => "region",
            Self::Subcatchment => "subcatchment",
            Self::Sector => "sector",
            Self::Flow => "flow",
            Self::ElevMin => "elev_min",
            Self::ElevMax => "elev_max",
            Self::LegendJoin => "legend_join",
            Self::Dedup => "dedup",
        })
    }
}

/// How a stage resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// The stage filtered (or deduplicated) the row set.
    Applied,
    /// No criterion configured; the stage was a no-op.
    NoCriterion,
    /// A needed column is absent; the stage was skipped as a no-op.
    MissingColumn,
    /// The stage ended the scenario with an empty result.
    Abandoned,
}

/// One record of the cascade event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Human-readable rendering of the criterion (or skip reason).
    pub criterion: String,
    pub outcome: StageOutcome,
}

impl StageEvent {
    pub fn new(
        stage: Stage,
        rows_before: usize,
        rows_after: usize,
        criterion: impl Into<String>,
        outcome: StageOutcome,
    ) -> Self {
        Self {
            stage,
            rows_before,
            rows_after,
            criterion: criterion.into(),
            outcome,
        }
    }
}
