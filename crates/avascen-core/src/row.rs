//! Canonical row model for the release/runout results table.
//!
//! Canonical attributes are typed and nullable; a value that fails to
//! parse becomes the null sentinel rather than an error. All columns
//! outside the canonical contract pass through untouched in `attrs`,
//! and geometry is carried as an opaque JSON value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flow regime of a simulated avalanche event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlowRegime {
    Dry,
    Wet,
}

impl FlowRegime {
    /// Case- and whitespace-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry" => Some(Self::Dry),
            "wet" => Some(Self::Wet),
            _ => None,
        }
    }
}

impl fmt::Display for FlowRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dry => "dry",
            Self::Wet => "wet",
        })
    }
}

/// Compass aspect sector of a release area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AspectSector {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl AspectSector {
    /// Case- and whitespace-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Some(Self::N),
            "NE" => Some(Self::NE),
            "E" => Some(Self::E),
            "SE" => Some(Self::SE),
            "S" => Some(Self::S),
            "SW" => Some(Self::SW),
            "W" => Some(Self::W),
            "NW" => Some(Self::NW),
            _ => None,
        }
    }
}

impl fmt::Display for AspectSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::N => "N",
            Self::NE => "NE",
            Self::E => "E",
            Self::SE => "SE",
            Self::S => "S",
            Self::SW => "SW",
            Self::W => "W",
            Self::NW => "NW",
        })
    }
}

/// Geometry role of one result row: runout (`res`) or release (`rel`)
/// geometry. A combined `res / rel` tag exists only on the legend side;
/// at row level it normalizes to null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeometryRole {
    Res,
    Rel,
}

impl GeometryRole {
    /// Case- and whitespace-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "res" => Some(Self::Res),
            "rel" => Some(Self::Rel),
            _ => None,
        }
    }
}

impl fmt::Display for GeometryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Res => "res",
            Self::Rel => "rel",
        })
    }
}

/// One record of the results table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRow {
    /// Release-area identifier (opaque key).
    pub release_area_id: Option<String>,
    pub admin_region_id: Option<String>,
    pub forecast_region_id: Option<String>,
    pub subcatchment: Option<i64>,
    /// Aspect sector as delivered; normalized only at compare time.
    pub sector: Option<String>,
    /// Lower release elevation bound in metres.
    pub elev_min: Option<f64>,
    /// Upper release elevation bound in metres.
    pub elev_max: Option<f64>,
    pub flow: Option<FlowRegime>,
    pub geometry_role: Option<GeometryRole>,
    /// Release mobility code (PPM).
    pub ppm: Option<i64>,
    /// Event mobility code (PEM).
    pub pem: Option<i64>,
    /// Relative size index 1–5 (rSize).
    pub rel_size: Option<i64>,
    /// Passthrough columns outside the canonical contract.
    pub attrs: BTreeMap<String, Value>,
    /// Opaque geometry, never interpreted.
    pub geometry: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_parse_is_case_and_whitespace_insensitive() {
        assert_eq!(FlowRegime::parse(" Dry "), Some(FlowRegime::Dry));
        assert_eq!(FlowRegime::parse("WET"), Some(FlowRegime::Wet));
        assert_eq!(FlowRegime::parse("slush"), None);
    }

    #[test]
    fn sector_parse_accepts_lowercase() {
        assert_eq!(AspectSector::parse("ne"), Some(AspectSector::NE));
        assert_eq!(AspectSector::parse(" sw "), Some(AspectSector::SW));
        assert_eq!(AspectSector::parse("NNE"), None);
    }

    #[test]
    fn role_parse_rejects_combined_tag() {
        assert_eq!(GeometryRole::parse("res"), Some(GeometryRole::Res));
        assert_eq!(GeometryRole::parse("REL "), Some(GeometryRole::Rel));
        assert_eq!(GeometryRole::parse("res / rel"), None);
    }
}
