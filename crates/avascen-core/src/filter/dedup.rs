//! Single-result-per-release-area rule: within each identity group,
//! keep the row with the largest relative size index, ties going to
//! the first row encountered.

use std::cmp::Reverse;
use std::collections::HashSet;

use tracing::{info, warn};

use crate::criteria::ScenarioCriteria;
use crate::events::{Stage, StageEvent, StageOutcome};
use crate::row::ReleaseRow;
use crate::table::{col, ResultTable};

pub(super) fn apply(
    table: &mut ResultTable,
    criteria: &ScenarioCriteria,
    events: &mut Vec<StageEvent>,
) {
    let before = table.len();
    if !criteria.single_result {
        events.push(StageEvent::new(
            Stage::Dedup,
            before,
            before,
            "single-result rule disabled",
            StageOutcome::NoCriterion,
        ));
        return;
    }
    if !table.columns.has(col::R_SIZE) {
        warn!("column {} absent; single-result rule skipped", col::R_SIZE);
        events.push(StageEvent::new(
            Stage::Dedup,
            before,
            before,
            format!("column {} absent", col::R_SIZE),
            StageOutcome::MissingColumn,
        ));
        return;
    }

    let group_cols: Vec<&str> = col::DEDUP_GROUP
        .iter()
        .copied()
        .filter(|c| table.columns.has(c))
        .collect();

    // Stable sort keeps input order within equal sizes, so the first
    // row of each group after sorting is the keeper.
    table
        .rows
        .sort_by_key(|row| Reverse(row.rel_size.unwrap_or(i64::MIN)));

    let mut seen = HashSet::with_capacity(table.len());
    let mut kept = Vec::with_capacity(table.len());
    for row in table.rows.drain(..) {
        if seen.insert(group_key(&row, &group_cols)) {
            kept.push(row);
        }
    }
    table.rows = kept;

    info!("single-result rule dropped {} duplicates", before - table.len());
    events.push(StageEvent::new(
        Stage::Dedup,
        before,
        table.len(),
        format!("one row per ({})", group_cols.join(",")),
        StageOutcome::Applied,
    ));
}

/// Canonical token sequence identifying a row's group. Unit-separator
/// joined so distinct tuples cannot collide.
fn group_key(row: &ReleaseRow, group_cols: &[&str]) -> String {
    let mut key = String::new();
    for name in group_cols {
        let token = match *name {
            col::PRA_ID => opt_text(&row.release_area_id),
            col::ADMIN_REGION => opt_text(&row.admin_region_id),
            col::FORECAST_REGION => opt_text(&row.forecast_region_id),
            col::SUBCATCHMENT => opt_display(row.subcatchment),
            col::SECTOR => opt_text(&row.sector),
            col::ELEV_MIN => opt_display(row.elev_min),
            col::ELEV_MAX => opt_display(row.elev_max),
            col::FLOW => opt_display(row.flow),
            col::MOD_TYPE => opt_display(row.geometry_role),
            other => row
                .attrs
                .get(other)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        };
        key.push_str(&token);
        key.push('\u{1f}');
    }
    key
}

fn opt_text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn opt_display<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}
