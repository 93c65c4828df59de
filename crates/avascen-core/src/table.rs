//! Tabular model and column normalization.
//!
//! Ingestion brings heterogeneous input records onto the canonical
//! schema: mobility-code columns get their canonical upper-case names
//! regardless of input casing, numeric columns coerce to nullable
//! numerics (non-numeric values become null, never an error), and the
//! flow and geometry-role columns are lower-cased and trimmed. Every
//! other column passes through untouched.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

use crate::error::CoreError;
use crate::row::{FlowRegime, GeometryRole, ReleaseRow};

/// Canonical column names of the results attribute contract.
pub mod col {
    pub const PRA_ID: &str = "praID";
    pub const ADMIN_REGION: &str = "LKGebietID";
    pub const FORECAST_REGION: &str = "LWDGebietID";
    pub const SUBCATCHMENT: &str = "subC";
    pub const SECTOR: &str = "sector";
    pub const ELEV_MIN: &str = "elevMin";
    pub const ELEV_MAX: &str = "elevMax";
    pub const FLOW: &str = "flow";
    pub const MOD_TYPE: &str = "modType";
    pub const PPM: &str = "PPM";
    pub const PEM: &str = "PEM";
    pub const R_SIZE: &str = "rSize";
    pub const GEOMETRY: &str = "geometry";

    /// Scenario metadata columns stamped by the classification join.
    pub const AVA_POTENTIAL: &str = "avaPotential";
    pub const AVA_SIZE: &str = "avaSize";

    /// Columns every input table must carry for filtering.
    pub const REQUIRED: &[&str] = &[
        PRA_ID,
        FLOW,
        SECTOR,
        SUBCATCHMENT,
        ELEV_MIN,
        ELEV_MAX,
        R_SIZE,
        ADMIN_REGION,
        FORECAST_REGION,
    ];

    /// Identity tuple of the single-result-per-release-area rule,
    /// restricted at runtime to the columns actually present.
    pub const DEDUP_GROUP: &[&str] = &[
        PRA_ID,
        "praAreaM",
        "praElevMin",
        "praElevMax",
        "praElevMean",
        "praElevBand",
        "praElevBandRule",
        "praAreaSized",
        ADMIN_REGION,
        "LKGebiet",
        "LKRegion",
        FORECAST_REGION,
        MOD_TYPE,
        SUBCATCHMENT,
        SECTOR,
        ELEV_MIN,
        ELEV_MAX,
        FLOW,
    ];
}

/// The set of column names observed in the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    present: BTreeSet<String>,
}

impl ColumnSet {
    pub fn has(&self, name: &str) -> bool {
        self.present.contains(name)
    }

    pub fn insert(&mut self, name: &str) {
        if !self.present.contains(name) {
            self.present.insert(name.to_string());
        }
    }

    pub fn extend_from(&mut self, other: &ColumnSet) {
        for name in &other.present {
            self.insert(name);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.present.iter().map(String::as_str)
    }

    /// Required columns absent from this set.
    pub fn missing_required(&self) -> Vec<&'static str> {
        col::REQUIRED
            .iter()
            .copied()
            .filter(|c| !self.has(c))
            .collect()
    }
}

/// The normalized results table: typed rows, the observed column set,
/// and an opaque coordinate reference passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: ColumnSet,
    pub rows: Vec<ReleaseRow>,
    pub crs: Option<Value>,
}

impl ResultTable {
    /// Ingest loose records, normalizing columns on the way in. The
    /// caller's records are consumed; nothing is mutated in place.
    pub fn from_records(records: Vec<Map<String, Value>>, crs: Option<Value>) -> Self {
        let mut columns = ColumnSet::default();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut row = ReleaseRow::default();
            for (key, value) in record {
                let name = canonical_name(&key);
                columns.insert(&name);
                match name.as_str() {
                    col::PRA_ID => row.release_area_id = as_text(&value),
                    col::ADMIN_REGION => row.admin_region_id = as_text(&value),
                    col::FORECAST_REGION => row.forecast_region_id = as_text(&value),
                    col::SUBCATCHMENT => row.subcatchment = as_int(&value),
                    col::SECTOR => row.sector = as_raw_text(&value),
                    col::ELEV_MIN => row.elev_min = as_float(&value),
                    col::ELEV_MAX => row.elev_max = as_float(&value),
                    col::FLOW => row.flow = as_text(&value).and_then(|s| FlowRegime::parse(&s)),
                    col::MOD_TYPE => {
                        row.geometry_role = as_text(&value).and_then(|s| GeometryRole::parse(&s))
                    }
                    col::PPM => row.ppm = as_int(&value),
                    col::PEM => row.pem = as_int(&value),
                    col::R_SIZE => row.rel_size = as_int(&value),
                    col::GEOMETRY => row.geometry = (!value.is_null()).then_some(value),
                    _ => {
                        row.attrs.insert(name.clone(), value);
                    }
                }
            }
            rows.push(row);
        }
        Self { columns, rows, crs }
    }

    /// Export rows back to loose records under canonical column names.
    /// Re-ingesting the output is a no-op.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                let mut put = |name: &str, value: Value| {
                    if self.columns.has(name) {
                        record.insert(name.to_string(), value);
                    }
                };
                put(col::PRA_ID, text_value(&row.release_area_id));
                put(col::ADMIN_REGION, text_value(&row.admin_region_id));
                put(col::FORECAST_REGION, text_value(&row.forecast_region_id));
                put(col::SUBCATCHMENT, int_value(row.subcatchment));
                put(col::SECTOR, text_value(&row.sector));
                put(col::ELEV_MIN, float_value(row.elev_min));
                put(col::ELEV_MAX, float_value(row.elev_max));
                put(col::FLOW, display_value(row.flow.as_ref()));
                put(col::MOD_TYPE, display_value(row.geometry_role.as_ref()));
                put(col::PPM, int_value(row.ppm));
                put(col::PEM, int_value(row.pem));
                put(col::R_SIZE, int_value(row.rel_size));
                put(col::GEOMETRY, row.geometry.clone().unwrap_or(Value::Null));
                for (key, value) in &row.attrs {
                    record.insert(key.clone(), value.clone());
                }
                record
            })
            .collect()
    }

    /// Hard validation of the input contract, reported before any
    /// filtering begins.
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing = self.columns.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingColumns(
                missing.iter().map(|c| c.to_string()).collect(),
            ))
        }
    }

    /// A table with the same columns and CRS but a new row set.
    pub fn with_rows(&self, rows: Vec<ReleaseRow>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
            crs: self.crs.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Mobility-code columns get their canonical upper-case names whatever
/// the input casing; every other name stays as delivered.
fn canonical_name(name: &str) -> String {
    if name.eq_ignore_ascii_case(col::PPM) {
        col::PPM.to_string()
    } else if name.eq_ignore_ascii_case(col::PEM) {
        col::PEM.to_string()
    } else {
        name.to_string()
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Sector values keep their exact input spelling; normalization for
/// them happens at compare time only.
fn as_raw_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn text_value(v: &Option<String>) -> Value {
    v.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
}

fn int_value(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::from)
}

fn float_value(v: Option<f64>) -> Value {
    v.and_then(Number::from_f64).map_or(Value::Null, Value::Number)
}

fn display_value<T: std::fmt::Display>(v: Option<&T>) -> Value {
    v.map_or(Value::Null, |x| Value::String(x.to_string()))
}
