use std::path::Path;

use anyhow::Context;
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::error::EngineError;
use crate::scoring::{ScoreThresholds, ScoreWeights, ScoringPreset};

/// Where one calendar day ends and the next begins.
///
/// Readings with an explicit offset are shifted into this offset before the
/// date is taken; readings without one are read as local time here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn from_minutes(utc_offset_minutes: i32) -> Result<Self, EngineError> {
        utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or_else(|| {
                EngineError::InvalidParameter(format!(
                    "utc offset of {utc_offset_minutes} minutes is out of range"
                ))
            })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeightOverrides {
    pub level_deviation: Option<f64>,
    pub storage_trend: Option<f64>,
    pub recharge_efficiency: Option<f64>,
    pub extraction_pressure: Option<f64>,
    pub threshold_penalty: Option<f64>,
    pub yield_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub max_level_deviation_m: Option<f64>,
    pub storage_negativity_max: Option<f64>,
    pub critical_depth_m: Option<f64>,
    pub max_recharge_efficiency: Option<f64>,
    pub ideal_yield_percent: Option<f64>,
}

/// Engine settings, loadable from a JSON file.
///
/// ```json
/// { "preset": "legacy", "weights": { "yield_factor": 0.1 }, "utc_offset_minutes": 330 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preset: ScoringPreset,
    pub weights: WeightOverrides,
    pub thresholds: ThresholdOverrides,
    pub utc_offset_minutes: i32,
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, EngineError> {
        DayBoundary::from_minutes(self.utc_offset_minutes)
    }

    pub fn weights(&self) -> ScoreWeights {
        let base = self.preset.weights();
        let o = &self.weights;
        ScoreWeights {
            level_deviation: o.level_deviation.unwrap_or(base.level_deviation),
            storage_trend: o.storage_trend.unwrap_or(base.storage_trend),
            recharge_efficiency: o.recharge_efficiency.unwrap_or(base.recharge_efficiency),
            extraction_pressure: o.extraction_pressure.unwrap_or(base.extraction_pressure),
            threshold_penalty: o.threshold_penalty.unwrap_or(base.threshold_penalty),
            yield_factor: o.yield_factor.unwrap_or(base.yield_factor),
        }
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        let base = self.preset.thresholds();
        let o = &self.thresholds;
        ScoreThresholds {
            max_level_deviation_m: o.max_level_deviation_m.unwrap_or(base.max_level_deviation_m),
            storage_negativity_max: o
                .storage_negativity_max
                .unwrap_or(base.storage_negativity_max),
            critical_depth_m: o.critical_depth_m.unwrap_or(base.critical_depth_m),
            max_recharge_efficiency: o
                .max_recharge_efficiency
                .unwrap_or(base.max_recharge_efficiency),
            ideal_yield_percent: o.ideal_yield_percent.unwrap_or(base.ideal_yield_percent),
        }
    }
}
