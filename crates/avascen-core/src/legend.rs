//! Avalanche potential–size–role classification legend.
//!
//! The legend links a qualitative hazard potential level to the
//! reference size classes it supports and, per combination, the valid
//! (PPM, PEM, role) triples. It is defined in code with no external
//! input, so every build is reproducible byte for byte.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::row::GeometryRole;

/// Qualitative avalanche hazard potential level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HazardPotential {
    VeryHigh,
    High,
    Moderate,
    Low,
}

impl HazardPotential {
    /// Case- and whitespace-insensitive parse. The locale spelling
    /// "moderat" canonicalizes to `Moderate`; this is a fixed mapping,
    /// not fuzzy matching.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very high" => Some(Self::VeryHigh),
            "high" => Some(Self::High),
            "moderat" | "moderate" => Some(Self::Moderate),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for HazardPotential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VeryHigh => "very high",
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        })
    }
}

/// Legend-side geometry-role tag. `ResRel` means either geometry role
/// qualifies and expands to both row-level roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleTag {
    Res,
    Rel,
    ResRel,
}

impl RoleTag {
    pub fn roles(self) -> &'static [GeometryRole] {
        match self {
            Self::Res => &[GeometryRole::Res],
            Self::Rel => &[GeometryRole::Rel],
            Self::ResRel => &[GeometryRole::Res, GeometryRole::Rel],
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Res => "res",
            Self::Rel => "rel",
            Self::ResRel => "res / rel",
        })
    }
}

/// Relative size index derived from the mobility code pair.
///
/// A difference of 0,1,2,3,4 maps to 5,4,3,2,1. Any other difference
/// is invalid input and reported as an error, never silently mapped.
pub fn relative_size_index(ppm: i64, pem: i64) -> Result<i64, CoreError> {
    match ppm - pem {
        0 => Ok(5),
        1 => Ok(4),
        2 => Ok(3),
        3 => Ok(2),
        4 => Ok(1),
        _ => Err(CoreError::InvalidCodeDifference { ppm, pem }),
    }
}

/// One legend rule: a (potential, size class) pair admits the
/// (ppm, pem, role) combination, with the derived relative size index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub potential: HazardPotential,
    /// Reference size class (PEM header).
    pub size_class: u8,
    pub ppm: i64,
    pub pem: i64,
    pub rel_size: i64,
    pub role: RoleTag,
}

/// Valid (potential, size class) → (PPM, PEM, role) combinations.
const BLOCKS: &[(HazardPotential, u8, [(i64, i64, RoleTag); 4])] = {
    use HazardPotential::*;
    use RoleTag::*;
    &[
        (VeryHigh, 5, [(5, 5, ResRel), (4, 4, ResRel), (3, 3, ResRel), (2, 2, ResRel)]),
        (VeryHigh, 4, [(5, 4, ResRel), (4, 4, ResRel), (3, 3, ResRel), (2, 2, ResRel)]),
        (VeryHigh, 3, [(5, 3, ResRel), (4, 3, ResRel), (3, 3, ResRel), (2, 2, ResRel)]),
        (VeryHigh, 2, [(5, 2, ResRel), (4, 2, ResRel), (3, 2, ResRel), (2, 2, ResRel)]),
        (High, 4, [(5, 4, ResRel), (4, 3, ResRel), (3, 2, ResRel), (2, 2, Rel)]),
        (High, 3, [(5, 3, ResRel), (4, 3, ResRel), (3, 2, ResRel), (2, 2, Rel)]),
        (High, 2, [(5, 2, ResRel), (4, 2, ResRel), (3, 2, ResRel), (2, 2, Rel)]),
        (Moderate, 3, [(5, 3, ResRel), (4, 2, ResRel), (3, 3, Rel), (2, 2, Rel)]),
        (Moderate, 2, [(5, 2, ResRel), (4, 2, ResRel), (3, 3, Rel), (2, 2, Rel)]),
        (Low, 2, [(5, 2, ResRel), (4, 4, Rel), (3, 3, Rel), (2, 2, Rel)]),
    ]
};

/// The complete classification legend, built once per run and shared
/// read-only across all scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Legend {
    entries: Vec<LegendEntry>,
}

impl Legend {
    /// Build the full legend. Each entry's relative size index is
    /// recomputed from its code pair, so the legend and the row data
    /// share a single mapping.
    pub fn build() -> Result<Self, CoreError> {
        let mut entries = Vec::with_capacity(BLOCKS.len() * 4);
        for &(potential, size_class, combos) in BLOCKS {
            for &(ppm, pem, role) in combos.iter() {
                entries.push(LegendEntry {
                    potential,
                    size_class,
                    ppm,
                    pem,
                    rel_size: relative_size_index(ppm, pem)?,
                    role,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Build a legend from explicit entries, for callers that need a
    /// reduced or synthetic matrix (tests, what-if runs).
    pub fn from_entries(entries: Vec<LegendEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    /// Entries matching any of the given potentials at the given size
    /// class.
    pub fn select(&self, potentials: &[HazardPotential], size_class: u8) -> Vec<&LegendEntry> {
        self.entries
            .iter()
            .filter(|e| e.size_class == size_class && potentials.contains(&e.potential))
            .collect()
    }

    /// Highest size class the legend defines for a potential.
    /// Diagnostic aid for empty selections.
    pub fn max_size_class(&self, potential: HazardPotential) -> Option<u8> {
        self.entries
            .iter()
            .filter(|e| e.potential == potential)
            .map(|e| e.size_class)
            .max()
    }

    /// Expand a selection into the deduplicated set of allowed
    /// (ppm, pem, rel_size, role) quadruples. `ResRel` entries
    /// contribute one quadruple per role.
    pub fn allowed_quadruples(
        selection: &[&LegendEntry],
    ) -> BTreeSet<(i64, i64, i64, GeometryRole)> {
        let mut allowed = BTreeSet::new();
        for entry in selection {
            for &role in entry.role.roles() {
                allowed.insert((entry.ppm, entry.pem, entry.rel_size, role));
            }
        }
        allowed
    }
}
