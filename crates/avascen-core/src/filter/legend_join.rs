//! Classification join: narrows the row set to the mobility-code and
//! geometry-role combinations the legend admits for the requested
//! potential/size pair, then stamps the scenario metadata columns.
//!
//! Size class 1 is release-geometry-only mode and bypasses the legend:
//! only `rel` rows qualify, collapsed to one per release area by the
//! shortest-runout proxy (smallest PEM, ties broken by largest rSize).

use std::cmp::Reverse;
use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::criteria::ScenarioCriteria;
use crate::events::{Stage, StageEvent, StageOutcome};
use crate::filter::{handle_missing_column, MissingColumnPolicy};
use crate::legend::{relative_size_index, HazardPotential, Legend};
use crate::row::GeometryRole;
use crate::table::{col, ResultTable};

const POLICY: MissingColumnPolicy = MissingColumnPolicy::AbandonScenario;

pub(super) fn apply(
    table: &mut ResultTable,
    criteria: &ScenarioCriteria,
    legend: &Legend,
    events: &mut Vec<StageEvent>,
) {
    let before = table.len();
    let size_class = match criteria.size_class {
        Some(s) if !criteria.potentials.is_empty() => s,
        _ => {
            events.push(StageEvent::new(
                Stage::LegendJoin,
                before,
                before,
                "no classification criterion",
                StageOutcome::NoCriterion,
            ));
            return;
        }
    };

    let needed = [col::PPM, col::PEM, col::R_SIZE, col::MOD_TYPE];
    let missing: Vec<&str> = needed
        .iter()
        .copied()
        .filter(|c| !table.columns.has(c))
        .collect();
    if !missing.is_empty() {
        handle_missing_column(
            POLICY,
            Stage::LegendJoin,
            table,
            events,
            format!("columns absent: {}", missing.join(", ")),
        );
        return;
    }

    if size_class == 1 {
        apply_rel_only(table, criteria, events, before);
        return;
    }

    let selection = legend.select(&criteria.potentials, size_class);
    if selection.is_empty() {
        let diagnostic = max_size_diagnostic(legend, &criteria.potentials);
        warn!(
            "no legend entries for potentials={:?} size_class={size_class} ({diagnostic})",
            criteria.potentials
        );
        table.rows.clear();
        events.push(StageEvent::new(
            Stage::LegendJoin,
            before,
            0,
            format!("size_class={size_class} not in legend; {diagnostic}"),
            StageOutcome::Abandoned,
        ));
        return;
    }

    let allowed = Legend::allowed_quadruples(&selection);

    let invalid = table
        .rows
        .iter()
        .filter(|r| {
            matches!((r.ppm, r.pem), (Some(p), Some(e)) if relative_size_index(p, e).is_err())
        })
        .count();
    if invalid > 0 {
        warn!("{invalid} rows carry a mobility code pair outside the defined 0-4 difference range");
    }

    table.rows.retain(|row| {
        match (row.ppm, row.pem, row.rel_size, row.geometry_role) {
            (Some(ppm), Some(pem), Some(rel_size), Some(role)) => {
                allowed.contains(&(ppm, pem, rel_size, role))
            }
            _ => false,
        }
    });
    info!(
        "legend filter potentials={:?} size_class={size_class} kept {}/{} rows",
        criteria.potentials,
        table.len(),
        before
    );

    if !table.is_empty() {
        stamp(table, &criteria.potentials, size_class);
    }
    events.push(StageEvent::new(
        Stage::LegendJoin,
        before,
        table.len(),
        format!("potentials={:?} size_class={size_class}", criteria.potentials),
        StageOutcome::Applied,
    ));
}

/// Size class 1: keep release geometries only, one per release area.
fn apply_rel_only(
    table: &mut ResultTable,
    criteria: &ScenarioCriteria,
    events: &mut Vec<StageEvent>,
    before: usize,
) {
    table
        .rows
        .retain(|row| row.geometry_role == Some(GeometryRole::Rel));

    if table.is_empty() {
        warn!("size class 1 requested but no release geometries present");
        events.push(StageEvent::new(
            Stage::LegendJoin,
            before,
            0,
            "size_class=1 (rel only)",
            StageOutcome::Applied,
        ));
        return;
    }

    // Smallest PEM wins per release area (shortest-runout proxy);
    // ties prefer the largest relative size, then the first row seen.
    let mut kept = Vec::with_capacity(table.len());
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    for row in table.rows.drain(..) {
        let key = row.release_area_id.clone();
        match index.get(&key) {
            None => {
                index.insert(key, kept.len());
                kept.push(row);
            }
            Some(&at) => {
                if rel_only_rank(&row) < rel_only_rank(&kept[at]) {
                    kept[at] = row;
                }
            }
        }
    }
    table.rows = kept;
    stamp(table, &criteria.potentials, 1);
    info!("rel-only mode kept {}/{} rows", table.len(), before);
    events.push(StageEvent::new(
        Stage::LegendJoin,
        before,
        table.len(),
        "size_class=1 (rel only)",
        StageOutcome::Applied,
    ));
}

fn rel_only_rank(row: &crate::row::ReleaseRow) -> (i64, Reverse<i64>) {
    (
        row.pem.unwrap_or(i64::MAX),
        Reverse(row.rel_size.unwrap_or(i64::MIN)),
    )
}

/// Per requested potential, the highest size class the legend defines.
fn max_size_diagnostic(legend: &Legend, potentials: &[HazardPotential]) -> String {
    let parts: Vec<String> = potentials
        .iter()
        .map(|p| match legend.max_size_class(*p) {
            Some(max) => format!("{p}: max size class {max}"),
            None => format!("{p}: not in legend"),
        })
        .collect();
    parts.join("; ")
}

/// Stamp the resolved classification onto every surviving row.
fn stamp(table: &mut ResultTable, potentials: &[HazardPotential], size_class: u8) {
    let mut labels: Vec<String> = potentials.iter().map(|p| p.to_string()).collect();
    labels.sort();
    labels.dedup();
    let joined = labels.join(",");
    for row in &mut table.rows {
        row.attrs
            .insert(col::AVA_POTENTIAL.to_string(), Value::String(joined.clone()));
        row.attrs
            .insert(col::AVA_SIZE.to_string(), Value::from(i64::from(size_class)));
    }
    table.columns.insert(col::AVA_POTENTIAL);
    table.columns.insert(col::AVA_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{LooseList, LooseScalar, ScenarioSpec};
    use serde_json::json;

    fn classified_record(
        pra: &str,
        ppm: i64,
        pem: i64,
        rsize: i64,
        role: &str,
    ) -> serde_json::Map<String, Value> {
        [
            (col::PRA_ID.to_string(), json!(pra)),
            (col::PPM.to_string(), json!(ppm)),
            (col::PEM.to_string(), json!(pem)),
            (col::R_SIZE.to_string(), json!(rsize)),
            (col::MOD_TYPE.to_string(), json!(role)),
        ]
        .into_iter()
        .collect()
    }

    fn criteria(potentials: &str, size_class: i64) -> ScenarioCriteria {
        ScenarioCriteria::from_spec(&ScenarioSpec {
            potentials: Some(LooseList::One(LooseScalar::Text(potentials.into()))),
            size_class: Some(LooseScalar::Int(size_class)),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn quadruple_join_keeps_exact_matches_only() {
        let table_rows = vec![
            classified_record("a", 5, 4, 4, "res"), // in (high, 4)
            classified_record("b", 5, 4, 4, "rel"), // ResRel expansion admits rel too
            classified_record("c", 2, 2, 5, "res"), // (high,4) lists (2,2) as rel-only
            classified_record("d", 5, 4, 3, "res"), // rSize contradicts code pair
            classified_record("e", 5, 1, 1, "res"), // (5,1) not in the high/4 block
        ];
        let mut table = ResultTable::from_records(table_rows, None);
        let legend = Legend::build().unwrap();
        let mut events = Vec::new();
        apply(&mut table, &criteria("high", 4), &legend, &mut events);
        let ids: Vec<_> = table
            .rows
            .iter()
            .map(|r| r.release_area_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn survivors_get_both_metadata_columns() {
        let mut table = ResultTable::from_records(
            vec![classified_record("a", 5, 4, 4, "res")],
            None,
        );
        let legend = Legend::build().unwrap();
        apply(
            &mut table,
            &criteria("very high, high", 4),
            &legend,
            &mut Vec::new(),
        );
        assert_eq!(table.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.attrs[col::AVA_POTENTIAL], json!("high,very high"));
        assert_eq!(row.attrs[col::AVA_SIZE], json!(4));
        assert!(table.columns.has(col::AVA_POTENTIAL));
    }

    #[test]
    fn missing_pair_abandons_with_diagnostic() {
        let mut table = ResultTable::from_records(
            vec![classified_record("a", 5, 5, 5, "res")],
            None,
        );
        let legend = Legend::build().unwrap();
        let mut events = Vec::new();
        // The legend defines high only up to size class 4.
        apply(&mut table, &criteria("high", 5), &legend, &mut events);
        assert!(table.is_empty());
        let event = &events[0];
        assert_eq!(event.outcome, StageOutcome::Abandoned);
        assert!(event.criterion.contains("high: max size class 4"));
    }

    #[test]
    fn rel_only_mode_prefers_smallest_pem_then_largest_rsize() {
        let mut table = ResultTable::from_records(
            vec![
                classified_record("a", 5, 4, 4, "rel"),
                classified_record("a", 5, 2, 2, "rel"), // smaller PEM wins
                classified_record("a", 4, 2, 3, "rel"), // same PEM, larger rSize wins
                classified_record("b", 3, 3, 5, "res"), // not a release geometry
            ],
            None,
        );
        let legend = Legend::build().unwrap();
        apply(&mut table, &criteria("low", 1), &legend, &mut Vec::new());
        assert_eq!(table.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.pem, Some(2));
        assert_eq!(row.rel_size, Some(3));
        assert_eq!(row.attrs[col::AVA_SIZE], json!(1));
    }

    #[test]
    fn rel_only_mode_without_release_rows_yields_empty() {
        let mut table = ResultTable::from_records(
            vec![classified_record("a", 5, 4, 4, "res")],
            None,
        );
        let legend = Legend::build().unwrap();
        let mut events = Vec::new();
        apply(&mut table, &criteria("low", 1), &legend, &mut events);
        assert!(table.is_empty());
        assert_eq!(events[0].rows_after, 0);
    }

    #[test]
    fn missing_code_columns_abandon_scenario() {
        let mut table = ResultTable::from_records(
            vec![[(col::PRA_ID.to_string(), json!("a"))].into_iter().collect()],
            None,
        );
        let legend = Legend::build().unwrap();
        let mut events = Vec::new();
        apply(&mut table, &criteria("high", 3), &legend, &mut events);
        assert!(table.is_empty());
        assert_eq!(events[0].outcome, StageOutcome::Abandoned);
    }
}
