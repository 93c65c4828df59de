//! Ordered scenario filter cascade.
//!
//! Stage order: region → subcatchment/sector/flow/elevation →
//! classification join → single-result rule. The cascade returns as
//! soon as the row set is empty, skipping the remaining stages.
//! Missing-column behavior is an explicit per-stage policy: region and
//! attribute stages skip-and-warn, the classification join abandons
//! the scenario.

mod attributes;
mod dedup;
mod legend_join;
mod region;

use crate::criteria::ScenarioCriteria;
use crate::events::StageEvent;
use crate::legend::Legend;
use crate::table::ResultTable;

/// What a stage does when a column it needs is absent from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingColumnPolicy {
    /// Warn and leave the row set unchanged.
    SkipStage,
    /// Warn and end the scenario with an empty result.
    AbandonScenario,
}

/// Resolve a stage whose column is absent according to its policy.
pub(crate) fn handle_missing_column(
    policy: MissingColumnPolicy,
    stage: crate::events::Stage,
    table: &mut ResultTable,
    events: &mut Vec<StageEvent>,
    detail: String,
) {
    use crate::events::StageOutcome;
    let before = table.len();
    match policy {
        MissingColumnPolicy::SkipStage => {
            tracing::warn!("{stage}: {detail}; stage skipped");
            events.push(StageEvent::new(stage, before, before, detail, StageOutcome::MissingColumn));
        }
        MissingColumnPolicy::AbandonScenario => {
            tracing::warn!("{stage}: {detail}; scenario abandoned");
            table.rows.clear();
            events.push(StageEvent::new(stage, before, 0, detail, StageOutcome::Abandoned));
        }
    }
}

/// The filtered table plus the event stream the cascade produced.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub table: ResultTable,
    pub events: Vec<StageEvent>,
}

/// Run the full cascade for one scenario against the shared normalized
/// table. The input table is never mutated.
pub fn filter_scenario(
    table: &ResultTable,
    criteria: &ScenarioCriteria,
    legend: &Legend,
) -> FilterOutcome {
    let mut events = Vec::new();
    let mut current = table.clone();

    region::apply(&mut current, criteria, &mut events);
    if current.is_empty() {
        return FilterOutcome { table: current, events };
    }

    for stage in attributes::STAGES {
        stage.apply(&mut current, criteria, &mut events);
        if current.is_empty() {
            return FilterOutcome { table: current, events };
        }
    }

    legend_join::apply(&mut current, criteria, legend, &mut events);
    if current.is_empty() {
        return FilterOutcome { table: current, events };
    }

    dedup::apply(&mut current, criteria, &mut events);
    FilterOutcome { table: current, events }
}
