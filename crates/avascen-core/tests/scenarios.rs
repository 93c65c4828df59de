//! End-to-end scenario runs against a small synthetic results table.

use avascen_core::col;
use avascen_core::criteria::{LooseList, LooseScalar, ScenarioSpec};
use avascen_core::events::{Stage, StageOutcome};
use avascen_core::{normalize_specs, run_scenarios, Legend, ResultTable, ScenarioCriteria};
use serde_json::{json, Map, Value};

struct Row<'a> {
    pra: &'a str,
    sub: i64,
    flow: &'a str,
    elev: (f64, f64),
    rsize: i64,
}

fn record(r: &Row) -> Map<String, Value> {
    [
        (col::PRA_ID.to_string(), json!(r.pra)),
        (col::ADMIN_REGION.to_string(), json!("701")),
        (col::FORECAST_REGION.to_string(), json!("lwd1")),
        (col::SUBCATCHMENT.to_string(), json!(r.sub)),
        (col::SECTOR.to_string(), json!("N")),
        (col::FLOW.to_string(), json!(r.flow)),
        (col::ELEV_MIN.to_string(), json!(r.elev.0)),
        (col::ELEV_MAX.to_string(), json!(r.elev.1)),
        (col::R_SIZE.to_string(), json!(r.rsize)),
    ]
    .into_iter()
    .collect()
}

/// Ten rows: duplicates within one release area, a wet row, an
/// off-subcatchment row, and two rows violating the elevation band.
fn ten_row_table() -> ResultTable {
    let rows = [
        Row { pra: "A", sub: 1, flow: "dry", elev: (1850.0, 2300.0), rsize: 2 },
        Row { pra: "A", sub: 1, flow: "dry", elev: (1850.0, 2300.0), rsize: 4 },
        Row { pra: "B", sub: 1, flow: "dry", elev: (1800.0, 2400.0), rsize: 3 },
        Row { pra: "C", sub: 1, flow: "wet", elev: (1850.0, 2300.0), rsize: 3 },
        Row { pra: "D", sub: 2, flow: "dry", elev: (1850.0, 2300.0), rsize: 3 },
        Row { pra: "E", sub: 1, flow: "dry", elev: (1700.0, 2300.0), rsize: 3 },
        Row { pra: "F", sub: 1, flow: "dry", elev: (1900.0, 2500.0), rsize: 3 },
        Row { pra: "G", sub: 1, flow: "dry", elev: (1800.0, 2400.0), rsize: 5 },
        Row { pra: "B", sub: 1, flow: "dry", elev: (1800.0, 2400.0), rsize: 1 },
        Row { pra: "H", sub: 1, flow: "dry", elev: (2400.0, 2400.0), rsize: 2 },
    ];
    ResultTable::from_records(rows.iter().map(record).collect(), None)
}

fn criteria(spec: ScenarioSpec) -> ScenarioCriteria {
    ScenarioCriteria::from_spec(&spec).unwrap()
}

fn text(s: &str) -> Option<LooseList> {
    Some(LooseList::One(LooseScalar::Text(s.into())))
}

#[test]
fn scenario_a_attribute_filters_then_dedup() {
    let table = ten_row_table();
    table.validate().unwrap();
    let crit = criteria(ScenarioSpec {
        name: Some("subc1-dry".into()),
        subcatchments: Some(LooseList::One(LooseScalar::Int(1))),
        flows: text("dry"),
        elev_min: Some(LooseScalar::Int(1800)),
        elev_max: Some(LooseScalar::Int(2400)),
        ..Default::default()
    });
    let legend = Legend::build().unwrap();
    let results = run_scenarios(&table, &[crit], &legend);
    assert_eq!(results.len(), 1);
    let out = &results[0].table;

    // Survivors, one per release area, highest rSize kept.
    let mut kept: Vec<(String, i64)> = out
        .rows
        .iter()
        .map(|r| (r.release_area_id.clone().unwrap(), r.rel_size.unwrap()))
        .collect();
    kept.sort();
    assert_eq!(
        kept,
        vec![
            ("A".to_string(), 4),
            ("B".to_string(), 3),
            ("G".to_string(), 5),
            ("H".to_string(), 2),
        ]
    );
}

#[test]
fn scenario_b_missing_legend_pair_yields_empty_with_diagnostic() {
    let full = Legend::build().unwrap();
    // A reduced matrix in which "high" stops at size class 3.
    let reduced = Legend::from_entries(
        full.entries()
            .iter()
            .filter(|e| {
                !(e.potential == avascen_core::HazardPotential::High && e.size_class == 4)
            })
            .copied()
            .collect(),
    );

    let mut records = vec![record(&Row {
        pra: "A",
        sub: 1,
        flow: "dry",
        elev: (1850.0, 2300.0),
        rsize: 4,
    })];
    records[0].insert(col::PPM.to_string(), json!(5));
    records[0].insert(col::PEM.to_string(), json!(4));
    records[0].insert(col::MOD_TYPE.to_string(), json!("res"));
    let table = ResultTable::from_records(records, None);

    let crit = criteria(ScenarioSpec {
        name: Some("high-4".into()),
        potentials: text("high"),
        size_class: Some(LooseScalar::Int(4)),
        ..Default::default()
    });

    let outcome = avascen_core::filter_scenario(&table, &crit, &reduced);
    assert!(outcome.table.is_empty());
    let join_event = outcome
        .events
        .iter()
        .find(|e| e.stage == Stage::LegendJoin)
        .unwrap();
    assert_eq!(join_event.outcome, StageOutcome::Abandoned);
    assert!(join_event.criterion.contains("high: max size class 3"));

    // The runner drops the scenario entirely.
    assert!(run_scenarios(&table, &[crit], &reduced).is_empty());
}

#[test]
fn scenario_c_rel_only_without_release_rows_is_empty_not_a_fault() {
    let mut records: Vec<Map<String, Value>> = ten_row_table().to_records();
    for r in &mut records {
        r.insert(col::PPM.to_string(), json!(3));
        r.insert(col::PEM.to_string(), json!(3));
        r.insert(col::MOD_TYPE.to_string(), json!("res"));
    }
    let table = ResultTable::from_records(records, None);

    let crit = criteria(ScenarioSpec {
        name: Some("rel-only".into()),
        potentials: text("low"),
        size_class: Some(LooseScalar::Int(1)),
        ..Default::default()
    });
    let legend = Legend::build().unwrap();
    let results = run_scenarios(&table, &[crit], &legend);
    assert!(results.is_empty());
}

#[test]
fn surviving_scenarios_keep_configured_order_and_identity() {
    let table = ten_row_table();
    let specs = vec![
        ScenarioSpec {
            name: Some("wet".into()),
            flows: text("wet"),
            ..Default::default()
        },
        ScenarioSpec {
            name: Some("nothing".into()),
            subcatchments: Some(LooseList::One(LooseScalar::Int(99))),
            ..Default::default()
        },
        ScenarioSpec {
            name: Some("dry".into()),
            flows: text("dry"),
            ..Default::default()
        },
    ];
    let legend = Legend::build().unwrap();
    let results = run_scenarios(&table, &normalize_specs(&specs), &legend);
    let names: Vec<&str> = results.iter().map(|r| r.criteria.name.as_str()).collect();
    assert_eq!(names, vec!["wet", "dry"]);
    assert!(results.iter().all(|r| !r.table.is_empty()));
}

#[test]
fn renormalizing_a_normalized_table_is_a_noop() {
    let table = ten_row_table();
    let again = ResultTable::from_records(table.to_records(), table.crs.clone());
    assert_eq!(table, again);
}
