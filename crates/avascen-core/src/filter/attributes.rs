//! Attribute filter stages: subcatchment, sector, flow regime and the
//! two elevation bounds. Applied independently and conjunctively; a
//! stage with no configured criterion is a no-op, and a row with a
//! null value in a filtered column never matches.

use tracing::debug;

use crate::criteria::ScenarioCriteria;
use crate::events::{Stage, StageEvent, StageOutcome};
use crate::filter::{handle_missing_column, MissingColumnPolicy};
use crate::row::{AspectSector, ReleaseRow};
use crate::table::{col, ResultTable};

pub(super) struct AttributeStage {
    stage: Stage,
    column: &'static str,
    policy: MissingColumnPolicy,
}

pub(super) const STAGES: &[AttributeStage] = &[
    AttributeStage {
        stage: Stage::Subcatchment,
        column: col::SUBCATCHMENT,
        policy: MissingColumnPolicy::SkipStage,
    },
    AttributeStage {
        stage: Stage::Sector,
        column: col::SECTOR,
        policy: MissingColumnPolicy::SkipStage,
    },
    AttributeStage {
        stage: Stage::Flow,
        column: col::FLOW,
        policy: MissingColumnPolicy::SkipStage,
    },
    AttributeStage {
        stage: Stage::ElevMin,
        column: col::ELEV_MIN,
        policy: MissingColumnPolicy::SkipStage,
    },
    AttributeStage {
        stage: Stage::ElevMax,
        column: col::ELEV_MAX,
        policy: MissingColumnPolicy::SkipStage,
    },
];

impl AttributeStage {
    pub(super) fn apply(
        &self,
        table: &mut ResultTable,
        criteria: &ScenarioCriteria,
        events: &mut Vec<StageEvent>,
    ) {
        let before = table.len();
        let Some(criterion) = self.describe(criteria) else {
            events.push(StageEvent::new(
                self.stage,
                before,
                before,
                "no criterion",
                StageOutcome::NoCriterion,
            ));
            return;
        };
        if !table.columns.has(self.column) {
            handle_missing_column(
                self.policy,
                self.stage,
                table,
                events,
                format!("column {} absent", self.column),
            );
            return;
        }

        table.rows.retain(|row| self.keep(row, criteria));
        debug!("{} filter kept {}/{} rows ({criterion})", self.stage, table.len(), before);
        events.push(StageEvent::new(
            self.stage,
            before,
            table.len(),
            criterion,
            StageOutcome::Applied,
        ));
    }

    /// Render the configured criterion, or `None` when it is absent.
    fn describe(&self, criteria: &ScenarioCriteria) -> Option<String> {
        match self.stage {
            Stage::Subcatchment => (!criteria.subcatchments.is_empty())
                .then(|| format!("subC in {:?}", criteria.subcatchments)),
            Stage::Sector => (!criteria.sectors.is_empty()).then(|| {
                let list: Vec<String> = criteria.sectors.iter().map(|s| s.to_string()).collect();
                format!("sector in [{}]", list.join(","))
            }),
            Stage::Flow => (!criteria.flows.is_empty()).then(|| {
                let list: Vec<String> = criteria.flows.iter().map(|f| f.to_string()).collect();
                format!("flow in [{}]", list.join(","))
            }),
            Stage::ElevMin => criteria.elev_min.map(|v| format!("elevMin >= {v}")),
            Stage::ElevMax => criteria.elev_max.map(|v| format!("elevMax <= {v}")),
            _ => None,
        }
    }

    fn keep(&self, row: &ReleaseRow, criteria: &ScenarioCriteria) -> bool {
        match self.stage {
            Stage::Subcatchment => row
                .subcatchment
                .is_some_and(|v| criteria.subcatchments.contains(&v)),
            Stage::Sector => row
                .sector
                .as_deref()
                .and_then(AspectSector::parse)
                .is_some_and(|s| criteria.sectors.contains(&s)),
            Stage::Flow => row.flow.is_some_and(|f| criteria.flows.contains(&f)),
            Stage::ElevMin => row
                .elev_min
                .zip(criteria.elev_min)
                .is_some_and(|(v, bound)| v >= bound),
            Stage::ElevMax => row
                .elev_max
                .zip(criteria.elev_max)
                .is_some_and(|(v, bound)| v <= bound),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{LooseList, LooseScalar, ScenarioSpec};
    use serde_json::json;

    fn table() -> ResultTable {
        let records = [
            ("a", 1, " n ", "dry", 1900.0, 2300.0),
            ("b", 1, "NE", "wet", 1700.0, 2300.0),
            ("c", 2, "S", "dry", 2000.0, 2600.0),
        ]
        .iter()
        .map(|(id, sub, sector, flow, lo, hi)| {
            [
                (col::PRA_ID.to_string(), json!(id)),
                (col::SUBCATCHMENT.to_string(), json!(sub)),
                (col::SECTOR.to_string(), json!(sector)),
                (col::FLOW.to_string(), json!(flow)),
                (col::ELEV_MIN.to_string(), json!(lo)),
                (col::ELEV_MAX.to_string(), json!(hi)),
            ]
            .into_iter()
            .collect()
        })
        .collect();
        ResultTable::from_records(records, None)
    }

    fn run_all(table: &mut ResultTable, spec: ScenarioSpec) -> Vec<StageEvent> {
        let criteria = ScenarioCriteria::from_spec(&spec).unwrap();
        let mut events = Vec::new();
        for stage in STAGES {
            stage.apply(table, &criteria, &mut events);
        }
        events
    }

    fn ids(table: &ResultTable) -> Vec<String> {
        table
            .rows
            .iter()
            .map(|r| r.release_area_id.clone().unwrap())
            .collect()
    }

    #[test]
    fn sector_compare_normalizes_row_values() {
        let mut t = table();
        run_all(
            &mut t,
            ScenarioSpec {
                sectors: Some(LooseList::One(LooseScalar::Text("N".into()))),
                ..Default::default()
            },
        );
        // Row "a" carries " n " and must still match.
        assert_eq!(ids(&t), vec!["a"]);
    }

    #[test]
    fn elevation_bounds_are_inclusive() {
        let mut t = table();
        run_all(
            &mut t,
            ScenarioSpec {
                elev_min: Some(LooseScalar::Int(1900)),
                elev_max: Some(LooseScalar::Int(2300)),
                ..Default::default()
            },
        );
        assert_eq!(ids(&t), vec!["a"]);
    }

    #[test]
    fn null_values_never_match() {
        let mut t = table();
        t.rows[0].subcatchment = None;
        run_all(
            &mut t,
            ScenarioSpec {
                subcatchments: Some(LooseList::One(LooseScalar::Int(1))),
                ..Default::default()
            },
        );
        assert_eq!(ids(&t), vec!["b"]);
    }

    #[test]
    fn absent_criteria_leave_rows_unchanged() {
        let mut t = table();
        let events = run_all(&mut t, ScenarioSpec::default());
        assert_eq!(t.len(), 3);
        assert!(events.iter().all(|e| e.outcome == StageOutcome::NoCriterion));
    }
}
