//! Multi-factor groundwater sustainability score.
//!
//! Six factors are each normalized to [0, 1], where 1 is most sustainable,
//! and combined with weights that sum to 1 into a percentage.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::daily::trailing;
use crate::error::EngineError;
use crate::fluctuation::sorted_by_date;
use crate::models::{DailyRecord, ScoreResult};
use crate::stats::{self, round_to};

/// Records averaged into the baseline level.
pub const BASELINE_DAYS: usize = 30;
/// Records considered by the trend-based factors.
pub const TRAILING_WINDOW: usize = 30;
/// Score used when a factor cannot be evaluated.
pub const NEUTRAL_SCORE: f64 = 0.5;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    LevelDeviation,
    StorageTrend,
    RechargeEfficiency,
    ExtractionPressure,
    ThresholdPenalty,
    YieldFactor,
}

impl ScoreFactor {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreFactor::LevelDeviation => "Level deviation",
            ScoreFactor::StorageTrend => "Storage trend",
            ScoreFactor::RechargeEfficiency => "Recharge efficiency",
            ScoreFactor::ExtractionPressure => "Extraction pressure",
            ScoreFactor::ThresholdPenalty => "Threshold penalty",
            ScoreFactor::YieldFactor => "Aquifer yield",
        }
    }
}

impl fmt::Display for ScoreFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub level_deviation: f64,
    pub storage_trend: f64,
    pub recharge_efficiency: f64,
    pub extraction_pressure: f64,
    pub threshold_penalty: f64,
    pub yield_factor: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            level_deviation: 0.30,
            storage_trend: 0.20,
            recharge_efficiency: 0.20,
            extraction_pressure: 0.10,
            threshold_penalty: 0.10,
            yield_factor: 0.10,
        }
    }
}

impl ScoreWeights {
    /// Five-factor weighting without the yield factor.
    pub fn legacy() -> Self {
        Self {
            level_deviation: 0.40,
            storage_trend: 0.25,
            recharge_efficiency: 0.20,
            extraction_pressure: 0.10,
            threshold_penalty: 0.05,
            yield_factor: 0.0,
        }
    }

    fn values(&self) -> [(&'static str, f64); 6] {
        [
            ("level_deviation", self.level_deviation),
            ("storage_trend", self.storage_trend),
            ("recharge_efficiency", self.recharge_efficiency),
            ("extraction_pressure", self.extraction_pressure),
            ("threshold_penalty", self.threshold_penalty),
            ("yield_factor", self.yield_factor),
        ]
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in self.values() {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidWeights(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        let total: f64 = self.values().iter().map(|(_, v)| v).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidWeights(format!(
                "weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreThresholds {
    /// Level drift from baseline that scores zero, meters.
    pub max_level_deviation_m: f64,
    /// Mean daily level change over the trailing window that scores zero.
    pub storage_negativity_max: f64,
    /// Levels strictly beyond this depth zero the threshold factor, meters.
    pub critical_depth_m: f64,
    /// Level change per mm of rain that scores one.
    pub max_recharge_efficiency: f64,
    pub ideal_yield_percent: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            max_level_deviation_m: 10.0,
            storage_negativity_max: 2.0,
            critical_depth_m: 50.0,
            max_recharge_efficiency: 0.5,
            ideal_yield_percent: 30.0,
        }
    }
}

impl ScoreThresholds {
    pub fn legacy() -> Self {
        Self {
            storage_negativity_max: 2_000_000.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("max_level_deviation_m", self.max_level_deviation_m),
            ("storage_negativity_max", self.storage_negativity_max),
            ("max_recharge_efficiency", self.max_recharge_efficiency),
            ("ideal_yield_percent", self.ideal_yield_percent),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidThresholds(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !self.critical_depth_m.is_finite() {
            return Err(EngineError::InvalidThresholds(format!(
                "critical_depth_m must be finite, got {}",
                self.critical_depth_m
            )));
        }
        Ok(())
    }
}

/// Named weight/threshold sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoringPreset {
    #[default]
    Standard,
    Legacy,
}

impl ScoringPreset {
    pub fn weights(&self) -> ScoreWeights {
        match self {
            ScoringPreset::Standard => ScoreWeights::default(),
            ScoringPreset::Legacy => ScoreWeights::legacy(),
        }
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        match self {
            ScoringPreset::Standard => ScoreThresholds::default(),
            ScoringPreset::Legacy => ScoreThresholds::legacy(),
        }
    }
}

/// Differences between consecutive records; `None` where either level is missing.
fn level_diffs(window: &[DailyRecord]) -> Vec<Option<f64>> {
    let mut diffs = Vec::with_capacity(window.len());
    diffs.push(None);
    for pair in window.windows(2) {
        let (prev, cur) = (pair[0].mean_level, pair[1].mean_level);
        diffs.push((prev.is_finite() && cur.is_finite()).then(|| cur - prev));
    }
    diffs.truncate(window.len());
    diffs
}

pub fn level_deviation_score(baseline: f64, latest: f64, thresholds: &ScoreThresholds) -> f64 {
    let deviation = (latest - baseline).abs();
    1.0 - (deviation / thresholds.max_level_deviation_m).min(1.0)
}

pub fn storage_trend_score(window: &[DailyRecord], thresholds: &ScoreThresholds) -> f64 {
    if window.len() < 2 {
        debug!(records = window.len(), "storage trend needs two records, using neutral score");
        return NEUTRAL_SCORE;
    }
    match stats::mean(level_diffs(window).into_iter().flatten()) {
        Some(mean_change) => {
            1.0 - (mean_change.abs() / thresholds.storage_negativity_max).min(1.0)
        }
        None => NEUTRAL_SCORE,
    }
}

pub fn recharge_efficiency_score(
    all: &[DailyRecord],
    window: &[DailyRecord],
    thresholds: &ScoreThresholds,
) -> f64 {
    let has_rainfall = all
        .iter()
        .any(|r| r.rainfall_mm.is_some_and(f64::is_finite));
    if !has_rainfall {
        debug!("no rainfall recorded, using neutral recharge score");
        return NEUTRAL_SCORE;
    }

    let ratios = window
        .iter()
        .zip(level_diffs(window))
        .filter_map(|(record, diff)| {
            let rain = record.rainfall_mm.filter(|r| r.is_finite() && *r > 0.0)?;
            Some(diff? / rain)
        });

    match stats::mean(ratios) {
        Some(avg_ratio) => (avg_ratio / thresholds.max_recharge_efficiency).clamp(0.0, 1.0),
        None => {
            debug!("no rainy days with a level change, using neutral recharge score");
            NEUTRAL_SCORE
        }
    }
}

pub fn extraction_pressure_score(window: &[DailyRecord]) -> f64 {
    if window.len() < 2 {
        return NEUTRAL_SCORE;
    }
    let diffs: Vec<f64> = level_diffs(window).into_iter().flatten().collect();
    if diffs.is_empty() {
        return NEUTRAL_SCORE;
    }
    let negative = diffs.iter().filter(|d| **d < 0.0).count();
    1.0 - negative as f64 / diffs.len() as f64
}

pub fn threshold_score(latest: f64, thresholds: &ScoreThresholds) -> f64 {
    if latest > thresholds.critical_depth_m {
        0.0
    } else {
        1.0
    }
}

pub fn yield_score(records: &[DailyRecord], thresholds: &ScoreThresholds) -> f64 {
    let median_yield = stats::median(records.iter().filter_map(|r| r.yield_percent))
        .unwrap_or_else(|| {
            debug!("no yield data, assuming half the ideal yield");
            thresholds.ideal_yield_percent / 2.0
        });
    (median_yield / thresholds.ideal_yield_percent).clamp(0.0, 1.0)
}

/// Scores a block's daily series.
///
/// `weights` and `thresholds` default to the standard preset. Callers
/// usually pass the most recent 30 to 60 days.
pub fn compute_score(
    records: &[DailyRecord],
    weights: Option<&ScoreWeights>,
    thresholds: Option<&ScoreThresholds>,
) -> Result<ScoreResult, EngineError> {
    let weights = weights.copied().unwrap_or_default();
    let thresholds = thresholds.copied().unwrap_or_default();
    weights.validate()?;
    thresholds.validate()?;

    let records = sorted_by_date(records);
    let levels: Vec<f64> = records
        .iter()
        .map(|r| r.mean_level)
        .filter(|l| l.is_finite())
        .collect();

    let (Some(baseline_level), Some(&latest_level)) = (
        stats::mean(levels.iter().take(BASELINE_DAYS).copied()),
        levels.last(),
    ) else {
        return Err(EngineError::InsufficientData {
            required: 1,
            available: 0,
        });
    };

    let window = trailing(&records, TRAILING_WINDOW);

    let score_level_dev = level_deviation_score(baseline_level, latest_level, &thresholds);
    let score_storage = storage_trend_score(window, &thresholds);
    let score_recharge = recharge_efficiency_score(&records, window, &thresholds);
    let score_extraction = extraction_pressure_score(window);
    let score_threshold = threshold_score(latest_level, &thresholds);
    let score_yield = yield_score(&records, &thresholds);

    let combined = score_level_dev * weights.level_deviation
        + score_storage * weights.storage_trend
        + score_recharge * weights.recharge_efficiency
        + score_extraction * weights.extraction_pressure
        + score_threshold * weights.threshold_penalty
        + score_yield * weights.yield_factor;

    Ok(ScoreResult {
        baseline_level,
        latest_level,
        score_level_dev,
        score_storage,
        score_recharge,
        score_extraction,
        score_threshold,
        score_yield,
        final_score_pct: round_to(combined * 100.0, 2).clamp(0.0, 100.0),
        records_used: records.len(),
        weights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaterQuality;
    use chrono::{Duration, NaiveDate};

    fn sample_record(day: i64, level: f64) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(day),
            mean_level: level,
            rainfall_mm: None,
            yield_percent: None,
            aquifer_type: None,
            quality: WaterQuality::default(),
            reading_count: 1,
        }
    }

    fn constant_series(days: i64, level: f64) -> Vec<DailyRecord> {
        (0..days)
            .map(|d| DailyRecord {
                rainfall_mm: Some(0.0),
                ..sample_record(d, level)
            })
            .collect()
    }

    /// 60 days falling linearly from -40 to -48 m with cycling rain and yield.
    fn declining_series() -> Vec<DailyRecord> {
        let rain = [0.0, 5.0, 10.0, 20.0];
        (0..60)
            .map(|d| DailyRecord {
                rainfall_mm: Some(rain[(d as usize * 7) % 4]),
                yield_percent: Some(10.0 + ((d * 7) % 26) as f64),
                ..sample_record(d, -40.0 - 8.0 * d as f64 / 59.0)
            })
            .collect()
    }

    #[test]
    fn default_weights_are_valid() {
        assert!(ScoreWeights::default().validate().is_ok());
        assert!(ScoreWeights::legacy().validate().is_ok());
        assert!(ScoreThresholds::default().validate().is_ok());
        assert!(ScoreThresholds::legacy().validate().is_ok());
    }

    #[test]
    fn constant_dry_series_scores_stable_factors_high() {
        let result = compute_score(&constant_series(30, 20.0), None, None).unwrap();
        assert_eq!(result.score_level_dev, 1.0);
        assert_eq!(result.score_storage, 1.0);
        assert_eq!(result.score_recharge, 0.5);
        assert!((result.score_extraction - 1.0).abs() < 1e-9);
        assert_eq!(result.score_threshold, 1.0);
        // yield unknown: ideal / 2 gives half marks
        assert_eq!(result.score_yield, 0.5);
        // 0.3 + 0.2 + 0.1 + 0.1 + 0.1 + 0.05
        assert!((result.final_score_pct - 85.0).abs() < 1e-9);
        assert_eq!(result.baseline_level, 20.0);
        assert_eq!(result.latest_level, 20.0);
    }

    #[test]
    fn empty_or_levelless_series_is_insufficient() {
        assert_eq!(
            compute_score(&[], None, None),
            Err(EngineError::InsufficientData {
                required: 1,
                available: 0
            })
        );
        let nan = vec![sample_record(0, f64::NAN)];
        assert!(matches!(
            compute_score(&nan, None, None),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn threshold_penalty_only_beyond_critical_depth() {
        let at_limit = compute_score(&constant_series(5, 50.0), None, None).unwrap();
        assert_eq!(at_limit.score_threshold, 1.0);

        let beyond = compute_score(&constant_series(5, 50.01), None, None).unwrap();
        assert_eq!(beyond.score_threshold, 0.0);
    }

    #[test]
    fn declining_series_scores_strictly_between_bounds() {
        let result = compute_score(&declining_series(), None, None).unwrap();
        assert!(result.final_score_pct > 0.0 && result.final_score_pct < 100.0);
        assert_eq!(result.score_threshold, 1.0);
        assert!((result.baseline_level - (-40.0 - 8.0 * 14.5 / 59.0)).abs() < 1e-9);
        assert!((result.latest_level + 48.0).abs() < 1e-9);
        // every day falls, so extraction pressure is maximal
        assert_eq!(result.score_extraction, 0.0);
        for (_, score, _) in result.components() {
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn single_factor_weights_reach_both_ends_of_the_scale() {
        let only = |weights: ScoreWeights| {
            assert!(weights.validate().is_ok());
            weights
        };
        let zeroed = ScoreWeights {
            level_deviation: 0.0,
            storage_trend: 0.0,
            recharge_efficiency: 0.0,
            extraction_pressure: 0.0,
            threshold_penalty: 0.0,
            yield_factor: 0.0,
        };

        let threshold_only = only(ScoreWeights {
            threshold_penalty: 1.0,
            ..zeroed
        });
        let deep = compute_score(&constant_series(10, 60.0), Some(&threshold_only), None).unwrap();
        assert_eq!(deep.final_score_pct, 0.0);

        let deviation_only = only(ScoreWeights {
            level_deviation: 1.0,
            ..zeroed
        });
        let steady = compute_score(&constant_series(10, 20.0), Some(&deviation_only), None).unwrap();
        assert_eq!(steady.final_score_pct, 100.0);

        for weights in [threshold_only, deviation_only] {
            let result = compute_score(&declining_series(), Some(&weights), None).unwrap();
            assert!((0.0..=100.0).contains(&result.final_score_pct));
        }
    }

    #[test]
    fn level_deviation_saturates_at_max() {
        let t = ScoreThresholds::default();
        assert_eq!(level_deviation_score(10.0, 15.0, &t), 0.5);
        assert_eq!(level_deviation_score(10.0, 40.0, &t), 0.0);
    }

    #[test]
    fn storage_trend_uses_mean_daily_change() {
        let t = ScoreThresholds::default();
        let records = vec![sample_record(0, 10.0), sample_record(1, 11.0), sample_record(2, 12.0)];
        assert!((storage_trend_score(&records, &t) - 0.5).abs() < 1e-9);
        assert_eq!(storage_trend_score(&records[..1], &t), NEUTRAL_SCORE);
    }

    #[test]
    fn recharge_efficiency_averages_rainy_day_ratios() {
        let t = ScoreThresholds::default();
        let records = vec![
            DailyRecord {
                rainfall_mm: Some(0.0),
                ..sample_record(0, 10.0)
            },
            DailyRecord {
                rainfall_mm: Some(10.0),
                ..sample_record(1, 11.0)
            },
            DailyRecord {
                rainfall_mm: Some(20.0),
                ..sample_record(2, 13.0)
            },
        ];
        // ratios 0.1 and 0.1, over 0.5
        assert!((recharge_efficiency_score(&records, &records, &t) - 0.2).abs() < 1e-9);

        let falling = vec![
            sample_record(0, 10.0),
            DailyRecord {
                rainfall_mm: Some(5.0),
                ..sample_record(1, 8.0)
            },
        ];
        assert_eq!(recharge_efficiency_score(&falling, &falling, &t), 0.0);
    }

    #[test]
    fn recharge_ratio_uses_the_previous_day_even_when_dry() {
        let t = ScoreThresholds::default();
        let day = |d: i64, level: f64, rain: f64| DailyRecord {
            rainfall_mm: Some(rain),
            ..sample_record(d, level)
        };
        let records = vec![
            day(0, 10.0, 0.0),
            day(1, 11.0, 10.0),
            day(2, 12.0, 0.0),
            day(3, 13.0, 20.0),
        ];
        // ratios 1/10 and 1/20 (not 2/20 between the two rainy days)
        assert!((recharge_efficiency_score(&records, &records, &t) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn recharge_efficiency_falls_back_without_rain() {
        let t = ScoreThresholds::default();
        let records = vec![sample_record(0, 10.0), sample_record(1, 11.0)];
        assert_eq!(recharge_efficiency_score(&records, &records, &t), NEUTRAL_SCORE);

        // rain only on the first day has no previous level to compare against
        let first_only = vec![
            DailyRecord {
                rainfall_mm: Some(12.0),
                ..sample_record(0, 10.0)
            },
            DailyRecord {
                rainfall_mm: Some(0.0),
                ..sample_record(1, 11.0)
            },
        ];
        assert_eq!(
            recharge_efficiency_score(&first_only, &first_only, &t),
            NEUTRAL_SCORE
        );
    }

    #[test]
    fn extraction_pressure_counts_falling_days() {
        let records = vec![
            sample_record(0, 10.0),
            sample_record(1, 9.0),
            sample_record(2, 9.5),
            sample_record(3, 9.5),
            sample_record(4, 9.0),
        ];
        assert!((extraction_pressure_score(&records) - 0.5).abs() < 1e-9);
        assert_eq!(extraction_pressure_score(&records[..1]), NEUTRAL_SCORE);
    }

    #[test]
    fn yield_factor_uses_median_and_caps_at_one() {
        let t = ScoreThresholds::default();
        let with_yield = |values: &[f64]| -> Vec<DailyRecord> {
            values
                .iter()
                .enumerate()
                .map(|(i, y)| DailyRecord {
                    yield_percent: Some(*y),
                    ..sample_record(i as i64, 10.0)
                })
                .collect()
        };
        assert_eq!(yield_score(&with_yield(&[6.0, 15.0, 90.0]), &t), 0.5);
        assert_eq!(yield_score(&with_yield(&[45.0, 60.0]), &t), 1.0);
        assert_eq!(yield_score(&[sample_record(0, 1.0)], &t), 0.5);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let lopsided = ScoreWeights {
            level_deviation: 0.9,
            ..ScoreWeights::default()
        };
        assert!(matches!(
            compute_score(&constant_series(3, 1.0), Some(&lopsided), None),
            Err(EngineError::InvalidWeights(_))
        ));

        let negative = ScoreWeights {
            level_deviation: -0.1,
            storage_trend: 0.6,
            ..ScoreWeights::default()
        };
        assert!(negative.validate().is_err());

        let zero_ideal = ScoreThresholds {
            ideal_yield_percent: 0.0,
            ..ScoreThresholds::default()
        };
        assert!(matches!(
            compute_score(&constant_series(3, 1.0), None, Some(&zero_ideal)),
            Err(EngineError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn legacy_preset_runs_through_the_same_scorer() {
        let weights = ScoringPreset::Legacy.weights();
        let thresholds = ScoringPreset::Legacy.thresholds();
        let result =
            compute_score(&constant_series(30, 20.0), Some(&weights), Some(&thresholds)).unwrap();
        // 0.4 + 0.25 + 0.5 * 0.2 + 0.1 + 0.05
        assert!((result.final_score_pct - 90.0).abs() < 1e-9);
        assert_eq!(result.weights, ScoreWeights::legacy());
    }

    #[test]
    fn weakest_factor_names_the_largest_shortfall() {
        let result = compute_score(&declining_series(), None, None).unwrap();
        let weakest = result.weakest_factor().unwrap();
        let shortfall = |f: ScoreFactor| {
            result
                .components()
                .iter()
                .find(|(factor, _, _)| *factor == f)
                .map(|(_, s, w)| (1.0 - s) * w)
                .unwrap()
        };
        for (factor, _, _) in result.components() {
            assert!(shortfall(weakest) >= shortfall(factor));
        }

        let perfect = ScoreResult {
            score_recharge: 1.0,
            score_yield: 1.0,
            ..compute_score(&constant_series(30, 20.0), None, None).unwrap()
        };
        assert_eq!(perfect.weakest_factor(), None);
    }
}
