use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::scoring::{ScoreFactor, ScoreWeights};

/// A numeric field as delivered by an upstream row, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// One row of the reading stream, exactly as the data source supplied it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default, alias = "datetime")]
    pub datetime_ts: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub water_level: Option<RawValue>,
    #[serde(default)]
    pub rainfall_mm: Option<RawValue>,
    #[serde(default)]
    pub specific_yield: Option<RawValue>,
    #[serde(default)]
    pub aquifer_type: Option<String>,
    #[serde(default)]
    pub wq_ph: Option<RawValue>,
    #[serde(default)]
    pub wq_ec: Option<RawValue>,
    #[serde(default)]
    pub wq_cl: Option<RawValue>,
    #[serde(default)]
    pub wq_f: Option<RawValue>,
    #[serde(default)]
    pub wq_total_hardness: Option<RawValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterQuality {
    pub ph: Option<f64>,
    pub ec: Option<f64>,
    pub cl: Option<f64>,
    pub f: Option<f64>,
    pub total_hardness: Option<f64>,
}

/// A reading that survived normalization.
///
/// `timestamp` is expressed in the offset of the configured day boundary,
/// so `timestamp.date_naive()` is the calendar day the reading belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<FixedOffset>,
    pub district: Option<String>,
    pub block: Option<String>,
    /// Meters below ground level.
    pub water_level: f64,
    pub rainfall_mm: Option<f64>,
    /// Percentage (0-100) or fraction (0-1), as supplied.
    pub specific_yield: Option<f64>,
    pub aquifer_type: Option<String>,
    pub quality: WaterQuality,
}

impl Reading {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// One calendar day of readings for a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub mean_level: f64,
    /// `None` when no reading of the day carried rainfall.
    pub rainfall_mm: Option<f64>,
    /// Median of the day's `specific_yield` values.
    pub yield_percent: Option<f64>,
    pub aquifer_type: Option<String>,
    pub quality: WaterQuality,
    pub reading_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluctuationResult {
    pub last_date: NaiveDate,
    /// `latest.mean_level - previous.mean_level`, meters, 3 decimals.
    pub delta: f64,
    pub records_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Fluctuation {
    Change(FluctuationResult),
    InsufficientData { records_used: usize },
}

/// Day-over-day movement of the mean level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyChange {
    pub date: NaiveDate,
    pub mean_level: f64,
    pub delta_h_m: Option<f64>,
    /// Equivalent recharge proxy; positive when the level rose toward the surface.
    pub delta_h_eq_mm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub baseline_level: f64,
    pub latest_level: f64,
    pub score_level_dev: f64,
    pub score_storage: f64,
    pub score_recharge: f64,
    pub score_extraction: f64,
    pub score_threshold: f64,
    pub score_yield: f64,
    pub final_score_pct: f64,
    pub records_used: usize,
    pub weights: ScoreWeights,
}

impl ScoreResult {
    /// Each factor with its component score and weight, in scoring order.
    pub fn components(&self) -> [(ScoreFactor, f64, f64); 6] {
        [
            (
                ScoreFactor::LevelDeviation,
                self.score_level_dev,
                self.weights.level_deviation,
            ),
            (
                ScoreFactor::StorageTrend,
                self.score_storage,
                self.weights.storage_trend,
            ),
            (
                ScoreFactor::RechargeEfficiency,
                self.score_recharge,
                self.weights.recharge_efficiency,
            ),
            (
                ScoreFactor::ExtractionPressure,
                self.score_extraction,
                self.weights.extraction_pressure,
            ),
            (
                ScoreFactor::ThresholdPenalty,
                self.score_threshold,
                self.weights.threshold_penalty,
            ),
            (
                ScoreFactor::YieldFactor,
                self.score_yield,
                self.weights.yield_factor,
            ),
        ]
    }

    /// The factor that cost the most percentage points, if any were lost.
    pub fn weakest_factor(&self) -> Option<ScoreFactor> {
        let mut weakest: Option<(ScoreFactor, f64)> = None;
        for (factor, score, weight) in self.components() {
            let shortfall = (1.0 - score) * weight;
            if shortfall <= 0.0 {
                continue;
            }
            match weakest {
                Some((_, worst)) if worst >= shortfall => {}
                _ => weakest = Some((factor, shortfall)),
            }
        }
        weakest.map(|(factor, _)| factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldEstimate {
    pub area_ha: f64,
    pub days_used: usize,
    pub avg_specific_yield_fraction: f64,
    pub available_volume_m3: f64,
    pub irrigated_area_ha: f64,
}

/// Latest-day view of a block, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSnapshot {
    pub last_date: NaiveDate,
    pub last_water_level: f64,
    pub rainfall_mm: Option<f64>,
    pub aquifer_type: String,
    pub water_quality: WaterQuality,
    pub daily_rows: usize,
}
