//! Scenario filtering for avalanche release/runout result tables.
//!
//! A normalized attribute table is narrowed per configured scenario by
//! an ordered filter cascade (region, subcatchment, sector, flow,
//! elevation, classification legend join) and collapsed to a single
//! result per release area. Scenarios run independently; each returns
//! its filtered table together with a structured per-stage event
//! stream. Geometry and coordinate reference values pass through the
//! pipeline opaquely.

pub mod caaml;
pub mod criteria;
pub mod error;
pub mod events;
pub mod filter;
pub mod legend;
pub mod row;
pub mod runner;
pub mod table;

pub use criteria::{normalize_specs, RegionMode, ScenarioCriteria, ScenarioSpec};
pub use error::CoreError;
pub use events::{Stage, StageEvent, StageOutcome};
pub use filter::{filter_scenario, FilterOutcome, MissingColumnPolicy};
pub use legend::{relative_size_index, HazardPotential, Legend, LegendEntry, RoleTag};
pub use row::{AspectSector, FlowRegime, GeometryRole, ReleaseRow};
pub use runner::{master_table, run_scenarios, ScenarioResult};
pub use table::{col, ColumnSet, ResultTable};
