//! Scenario definitions: loosely-typed records in, validated criteria
//! out.
//!
//! Configuration surfaces deliver list fields as a list, a scalar, or
//! a comma-separated string; normalization flattens them once, at
//! construction, into deduplicated typed lists. A scenario that fails
//! normalization is skipped with a warning, never a crash.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::legend::HazardPotential;
use crate::row::{AspectSector, FlowRegime};

/// A scenario field that failed to normalize.
#[derive(Debug, Error)]
#[error("scenario '{scenario}': cannot parse {field} value {value:?}")]
pub struct CriteriaError {
    pub scenario: String,
    pub field: &'static str,
    pub value: String,
}

/// A scalar as configuration surfaces deliver it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LooseScalar {
    fn to_text(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(t) => t.trim().to_string(),
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(t) => t.trim().parse().ok(),
        }
    }
}

/// A field that may arrive as a list, a scalar, or a comma-separated
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseList {
    Many(Vec<LooseScalar>),
    One(LooseScalar),
}

impl LooseList {
    /// Flatten to trimmed string items, deduplicated with first
    /// occurrence winning.
    fn items(&self) -> Vec<String> {
        let scalars: Vec<&LooseScalar> = match self {
            Self::Many(v) => v.iter().collect(),
            Self::One(s) => vec![s],
        };
        let mut out: Vec<String> = Vec::new();
        for scalar in scalars {
            match scalar {
                LooseScalar::Text(t) => {
                    for part in t.split(',') {
                        let part = part.trim();
                        if !part.is_empty() && !out.iter().any(|x| x.as_str() == part) {
                            out.push(part.to_string());
                        }
                    }
                }
                other => {
                    let text = other.to_text();
                    if !out.contains(&text) {
                        out.push(text);
                    }
                }
            }
        }
        out
    }
}

fn items_of(field: &Option<LooseList>) -> Vec<String> {
    field.as_ref().map(LooseList::items).unwrap_or_default()
}

/// One scenario definition as configured, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSpec {
    pub name: Option<String>,
    pub admin_regions: Option<LooseList>,
    pub forecast_regions: Option<LooseList>,
    pub region_mode: Option<String>,
    pub subcatchments: Option<LooseList>,
    pub sectors: Option<LooseList>,
    pub flows: Option<LooseList>,
    pub elev_min: Option<LooseScalar>,
    pub elev_max: Option<LooseScalar>,
    pub potentials: Option<LooseList>,
    pub size_class: Option<LooseScalar>,
    pub single_result: Option<bool>,
}

/// How the two region-id sets combine when both are configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionMode {
    #[default]
    Or,
    And,
}

impl RegionMode {
    /// Anything other than "and" selects `Or`.
    fn parse(s: Option<&str>) -> Self {
        match s.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == "and" => Self::And,
            _ => Self::Or,
        }
    }
}

impl fmt::Display for RegionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Or => "or",
            Self::And => "and",
        })
    }
}

/// A canonical, validated filter specification. Read-only after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCriteria {
    pub name: String,
    pub admin_regions: Vec<String>,
    pub forecast_regions: Vec<String>,
    pub region_mode: RegionMode,
    pub subcatchments: Vec<i64>,
    pub sectors: Vec<AspectSector>,
    pub flows: Vec<FlowRegime>,
    /// Inclusive lower bound on a row's elevMin.
    pub elev_min: Option<f64>,
    /// Inclusive upper bound on a row's elevMax.
    pub elev_max: Option<f64>,
    pub potentials: Vec<HazardPotential>,
    /// Reference size class for the classification join.
    pub size_class: Option<u8>,
    /// Single-result-per-release-area rule, on by default.
    pub single_result: bool,
}

impl ScenarioCriteria {
    pub fn from_spec(spec: &ScenarioSpec) -> Result<Self, CriteriaError> {
        let name = spec
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "unnamed".to_string());

        let bad = |field: &'static str, value: String| CriteriaError {
            scenario: name.clone(),
            field,
            value,
        };

        let mut subcatchments = Vec::new();
        for item in items_of(&spec.subcatchments) {
            let v = item
                .parse::<i64>()
                .map_err(|_| bad("subcatchment", item.clone()))?;
            if !subcatchments.contains(&v) {
                subcatchments.push(v);
            }
        }

        let mut sectors = Vec::new();
        for item in items_of(&spec.sectors) {
            let v = AspectSector::parse(&item).ok_or_else(|| bad("sector", item.clone()))?;
            if !sectors.contains(&v) {
                sectors.push(v);
            }
        }

        let mut flows = Vec::new();
        for item in items_of(&spec.flows) {
            let v = FlowRegime::parse(&item).ok_or_else(|| bad("flow", item.clone()))?;
            if !flows.contains(&v) {
                flows.push(v);
            }
        }

        let mut potentials = Vec::new();
        for item in items_of(&spec.potentials) {
            let v = HazardPotential::parse(&item).ok_or_else(|| bad("potential", item.clone()))?;
            if !potentials.contains(&v) {
                potentials.push(v);
            }
        }

        let elev_min = match &spec.elev_min {
            None => None,
            Some(s) => Some(s.to_float().ok_or_else(|| bad("elev_min", s.to_text()))?),
        };
        let elev_max = match &spec.elev_max {
            None => None,
            Some(s) => Some(s.to_float().ok_or_else(|| bad("elev_max", s.to_text()))?),
        };

        let size_class = match &spec.size_class {
            None => None,
            Some(s) => {
                let text = s.to_text();
                let v = text
                    .parse::<i64>()
                    .ok()
                    .filter(|v| (0..=255).contains(v))
                    .ok_or_else(|| bad("size_class", text))?;
                Some(v as u8)
            }
        };

        Ok(Self {
            name,
            admin_regions: items_of(&spec.admin_regions),
            forecast_regions: items_of(&spec.forecast_regions),
            region_mode: RegionMode::parse(spec.region_mode.as_deref()),
            subcatchments,
            sectors,
            flows,
            elev_min,
            elev_max,
            potentials,
            size_class,
            single_result: spec.single_result.unwrap_or(true),
        })
    }

    /// The classification join runs only when both halves of the
    /// potential/size pair are configured.
    pub fn has_classification(&self) -> bool {
        !self.potentials.is_empty() && self.size_class.is_some()
    }
}

/// Normalize a spec list, warning about and skipping the invalid ones.
pub fn normalize_specs(specs: &[ScenarioSpec]) -> Vec<ScenarioCriteria> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        match ScenarioCriteria::from_spec(spec) {
            Ok(criteria) => out.push(criteria),
            Err(err) => warn!("skipping scenario: {err}"),
        }
    }
    out
}
