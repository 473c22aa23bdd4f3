use std::fmt::Write;

use crate::config::EngineConfig;
use crate::daily::trailing;
use crate::error::EngineError;
use crate::fluctuation::compute_fluctuation;
use crate::models::{DailyRecord, Fluctuation};
use crate::scoring::compute_score;
use crate::snapshot::build_snapshot;
use crate::yield_estimate::{estimate_yield, DEFAULT_AREA_HA};

/// Days handed to the scorer for a report.
pub const SCORE_WINDOW_DAYS: usize = 60;
pub const YIELD_WINDOW_DAYS: usize = 30;
pub const LEVEL_SERIES_DAYS: usize = 10;

fn fmt_opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.2}{unit}"),
        None => "n/a".to_string(),
    }
}

pub fn build_report(
    district: Option<&str>,
    block: &str,
    daily: &[DailyRecord],
    config: &EngineConfig,
) -> String {
    let mut output = String::new();
    let location = match district {
        Some(district) => format!("{block}, {district}"),
        None => block.to_string(),
    };

    let _ = writeln!(output, "# Groundwater Sustainability Report");
    let _ = writeln!(output, "Generated for {location}");
    let _ = writeln!(output);

    let snapshot = match build_snapshot(daily) {
        Ok(snapshot) => snapshot,
        Err(_) => {
            let _ = writeln!(output, "No groundwater readings recorded for this block.");
            return output;
        }
    };

    let _ = writeln!(output, "## Latest Day");
    let _ = writeln!(output, "- Date: {}", snapshot.last_date);
    let _ = writeln!(output, "- Water level: {:.2} m bgl", snapshot.last_water_level);
    let _ = writeln!(output, "- Rainfall: {}", fmt_opt(snapshot.rainfall_mm, " mm"));
    let _ = writeln!(output, "- Aquifer type: {}", snapshot.aquifer_type);
    let q = &snapshot.water_quality;
    let _ = writeln!(
        output,
        "- Water quality: pH {}, EC {}, Cl {}, F {}, hardness {}",
        fmt_opt(q.ph, ""),
        fmt_opt(q.ec, ""),
        fmt_opt(q.cl, ""),
        fmt_opt(q.f, ""),
        fmt_opt(q.total_hardness, "")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sustainability Score");
    let weights = config.weights();
    let thresholds = config.thresholds();
    match compute_score(
        trailing(daily, SCORE_WINDOW_DAYS),
        Some(&weights),
        Some(&thresholds),
    ) {
        Ok(score) => {
            let _ = writeln!(output, "Score: {:.2}%", score.final_score_pct);
            let _ = writeln!(
                output,
                "Baseline level {:.2} m, latest level {:.2} m",
                score.baseline_level, score.latest_level
            );
            for (factor, value, weight) in score.components() {
                let _ = writeln!(output, "- {factor}: {value:.3} (weight {weight:.2})");
            }
            if let Some(factor) = score.weakest_factor() {
                let _ = writeln!(output, "Largest drag on the score: {factor}");
            }
        }
        Err(err) => {
            let _ = writeln!(output, "Score unavailable: {err}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Fluctuation");
    match compute_fluctuation(daily) {
        Fluctuation::Change(change) => {
            let _ = writeln!(
                output,
                "{:+.3} m on {} ({} days of data)",
                change.delta, change.last_date, change.records_used
            );
        }
        Fluctuation::InsufficientData { records_used } => {
            let _ = writeln!(
                output,
                "Not enough daily data ({records_used} day recorded)."
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Irrigation Potential");
    match estimate_yield(daily, DEFAULT_AREA_HA, YIELD_WINDOW_DAYS) {
        Ok(estimate) => {
            let _ = writeln!(
                output,
                "{:.2} ha irrigable from {:.2} m3 available under {:.0} ha (specific yield {:.3})",
                estimate.irrigated_area_ha,
                estimate.available_volume_m3,
                estimate.area_ha,
                estimate.avg_specific_yield_fraction
            );
        }
        Err(EngineError::NoData) => {
            let _ = writeln!(output, "No specific yield data in the last {YIELD_WINDOW_DAYS} days.");
        }
        Err(err) => {
            let _ = writeln!(output, "Yield estimate unavailable: {err}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Mean Levels");
    for record in trailing(daily, LEVEL_SERIES_DAYS) {
        let _ = writeln!(
            output,
            "- {}: {:.2} m ({} readings)",
            record.date, record.mean_level, record.reading_count
        );
    }

    output
}
