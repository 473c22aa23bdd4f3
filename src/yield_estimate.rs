use crate::daily::trailing;
use crate::error::EngineError;
use crate::fluctuation::sorted_by_date;
use crate::models::{DailyRecord, YieldEstimate};
use crate::normalize::specific_yield_fraction;
use crate::stats::{self, round_to};

/// Reference block area when the caller gives none, hectares.
pub const DEFAULT_AREA_HA: f64 = 1000.0;
pub const SQUARE_METRES_PER_HA: f64 = 10_000.0;
/// Assumed saturated aquifer thickness, meters.
pub const SATURATED_THICKNESS_M: f64 = 5.0;
/// Seasonal irrigation demand of one hectare of crop, cubic meters.
pub const CROP_DEMAND_M3_PER_HA: f64 = 5000.0;

/// Estimates how many hectares the drainable storage under `area_ha` could irrigate.
///
/// Uses the last `window_days` records. Yields are averaged as recorded,
/// skipping days without one, and the mean is then converted to a fraction.
pub fn estimate_yield(
    records: &[DailyRecord],
    area_ha: f64,
    window_days: usize,
) -> Result<YieldEstimate, EngineError> {
    if !area_ha.is_finite() || area_ha < 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "area_ha must be a non-negative number, got {area_ha}"
        )));
    }

    let records = sorted_by_date(records);
    let window = trailing(&records, window_days);
    if window.is_empty() {
        return Err(EngineError::NoData);
    }

    let avg_sy = stats::mean(window.iter().filter_map(|r| r.yield_percent))
        .map(specific_yield_fraction)
        .ok_or(EngineError::NoData)?;

    let available_volume_m3 = area_ha * SQUARE_METRES_PER_HA * SATURATED_THICKNESS_M * avg_sy;

    Ok(YieldEstimate {
        area_ha,
        days_used: window.len(),
        avg_specific_yield_fraction: avg_sy,
        available_volume_m3: round_to(available_volume_m3, 2),
        irrigated_area_ha: round_to(available_volume_m3 / CROP_DEMAND_M3_PER_HA, 2),
    })
}
