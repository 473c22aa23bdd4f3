use crate::error::EngineError;
use crate::fluctuation::sorted_by_date;
use crate::models::{BlockSnapshot, DailyRecord, WaterQuality};
use crate::stats::round_to;

fn round2(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| round_to(v, 2))
}

/// The most recent day of a block's series.
pub fn build_snapshot(records: &[DailyRecord]) -> Result<BlockSnapshot, EngineError> {
    let records = sorted_by_date(records);
    let last = records.last().ok_or(EngineError::NoData)?;
    let q = &last.quality;

    Ok(BlockSnapshot {
        last_date: last.date,
        last_water_level: round_to(last.mean_level, 2),
        rainfall_mm: round2(last.rainfall_mm),
        aquifer_type: last
            .aquifer_type
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        water_quality: WaterQuality {
            ph: round2(q.ph),
            ec: round2(q.ec),
            cl: round2(q.cl),
            f: round2(q.f),
            total_hardness: round2(q.total_hardness),
        },
        daily_rows: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record(day: u32, level: f64) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            mean_level: level,
            rainfall_mm: Some(3.456),
            yield_percent: None,
            aquifer_type: None,
            quality: WaterQuality {
                ph: Some(7.456),
                ..WaterQuality::default()
            },
            reading_count: 2,
        }
    }

    #[test]
    fn snapshot_reflects_the_latest_day() {
        let records = vec![
            sample_record(2, 15.678),
            DailyRecord {
                aquifer_type: Some("Alluvium".to_string()),
                ..sample_record(1, 14.0)
            },
        ];
        let snapshot = build_snapshot(&records).unwrap();
        assert_eq!(snapshot.last_date, NaiveDate::from_ymd_opt(2024, 8, 2).unwrap());
        assert_eq!(snapshot.last_water_level, 15.68);
        assert_eq!(snapshot.rainfall_mm, Some(3.46));
        assert_eq!(snapshot.aquifer_type, "Unknown");
        assert_eq!(snapshot.water_quality.ph, Some(7.46));
        assert_eq!(snapshot.water_quality.ec, None);
        assert_eq!(snapshot.daily_rows, 2);
    }

    #[test]
    fn empty_series_has_no_snapshot() {
        assert_eq!(build_snapshot(&[]), Err(EngineError::NoData));
    }
}
