//! Region filter: administrative and forecast region id sets,
//! combinable by or/and.

use tracing::{debug, warn};

use crate::criteria::{RegionMode, ScenarioCriteria};
use crate::events::{Stage, StageEvent, StageOutcome};
use crate::filter::{handle_missing_column, MissingColumnPolicy};
use crate::table::{col, ResultTable};

const POLICY: MissingColumnPolicy = MissingColumnPolicy::SkipStage;

pub(super) fn apply(
    table: &mut ResultTable,
    criteria: &ScenarioCriteria,
    events: &mut Vec<StageEvent>,
) {
    let before = table.len();
    if criteria.admin_regions.is_empty() && criteria.forecast_regions.is_empty() {
        events.push(StageEvent::new(
            Stage::Region,
            before,
            before,
            "no region criterion",
            StageOutcome::NoCriterion,
        ));
        return;
    }

    let admin_wanted = !criteria.admin_regions.is_empty();
    let forecast_wanted = !criteria.forecast_regions.is_empty();
    let admin_usable = admin_wanted && table.columns.has(col::ADMIN_REGION);
    let forecast_usable = forecast_wanted && table.columns.has(col::FORECAST_REGION);

    if admin_wanted && !admin_usable {
        warn!("column {} absent; administrative region filter skipped", col::ADMIN_REGION);
    }
    if forecast_wanted && !forecast_usable {
        warn!("column {} absent; forecast region filter skipped", col::FORECAST_REGION);
    }
    if !admin_usable && !forecast_usable {
        handle_missing_column(
            POLICY,
            Stage::Region,
            table,
            events,
            "region id columns absent".to_string(),
        );
        return;
    }

    table.rows.retain(|row| {
        let admin = admin_usable.then(|| {
            row.admin_region_id
                .as_deref()
                .is_some_and(|v| criteria.admin_regions.iter().any(|r| r == v))
        });
        let forecast = forecast_usable.then(|| {
            row.forecast_region_id
                .as_deref()
                .is_some_and(|v| criteria.forecast_regions.iter().any(|r| r == v))
        });
        match (admin, forecast) {
            (Some(a), Some(f)) => match criteria.region_mode {
                RegionMode::And => a && f,
                RegionMode::Or => a || f,
            },
            (Some(a), None) => a,
            (None, Some(f)) => f,
            (None, None) => true,
        }
    });

    let criterion = format!(
        "admin in {:?} {} forecast in {:?}",
        criteria.admin_regions, criteria.region_mode, criteria.forecast_regions
    );
    debug!("region filter kept {}/{} rows ({criterion})", table.len(), before);
    events.push(StageEvent::new(
        Stage::Region,
        before,
        table.len(),
        criterion,
        StageOutcome::Applied,
    ));
}
