use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use crate::config::DayBoundary;
use crate::models::{DailyRecord, Reading, WaterQuality};
use crate::normalize::{names_match, normalize_readings};
use crate::source::{BlockQuery, ReadingSource};
use crate::stats;

#[derive(Default)]
struct DayAccumulator {
    levels: Vec<f64>,
    rainfall: Vec<f64>,
    yields: Vec<f64>,
    aquifer_type: Option<String>,
    ph: Vec<f64>,
    ec: Vec<f64>,
    cl: Vec<f64>,
    f: Vec<f64>,
    total_hardness: Vec<f64>,
}

impl DayAccumulator {
    fn push(&mut self, reading: &Reading) {
        self.levels.push(reading.water_level);
        self.rainfall.extend(reading.rainfall_mm);
        self.yields.extend(reading.specific_yield);
        if let Some(aquifer) = &reading.aquifer_type {
            self.aquifer_type = Some(aquifer.clone());
        }
        let q = &reading.quality;
        self.ph.extend(q.ph);
        self.ec.extend(q.ec);
        self.cl.extend(q.cl);
        self.f.extend(q.f);
        self.total_hardness.extend(q.total_hardness);
    }

    fn finish(self, date: NaiveDate) -> Option<DailyRecord> {
        let reading_count = self.levels.len();
        Some(DailyRecord {
            date,
            mean_level: stats::mean(self.levels)?,
            rainfall_mm: stats::sum(self.rainfall),
            yield_percent: stats::median(self.yields),
            aquifer_type: self.aquifer_type,
            quality: WaterQuality {
                ph: stats::mean(self.ph),
                ec: stats::mean(self.ec),
                cl: stats::mean(self.cl),
                f: stats::mean(self.f),
                total_hardness: stats::mean(self.total_hardness),
            },
            reading_count,
        })
    }
}

fn cmp_opt(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Total order over readings, timestamp first.
///
/// Ties on timestamp are broken by every other field so that the same
/// multiset of readings always folds in the same order.
fn canonical_order(a: &Reading, b: &Reading) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.water_level.total_cmp(&b.water_level))
        .then_with(|| cmp_opt(a.rainfall_mm, b.rainfall_mm))
        .then_with(|| cmp_opt(a.specific_yield, b.specific_yield))
        .then_with(|| a.aquifer_type.cmp(&b.aquifer_type))
        .then_with(|| cmp_opt(a.quality.ph, b.quality.ph))
        .then_with(|| cmp_opt(a.quality.ec, b.quality.ec))
        .then_with(|| cmp_opt(a.quality.cl, b.quality.cl))
        .then_with(|| cmp_opt(a.quality.f, b.quality.f))
        .then_with(|| cmp_opt(a.quality.total_hardness, b.quality.total_hardness))
}

/// Resamples readings into one record per calendar day, ascending by date.
///
/// With a `block_filter`, only readings whose block matches it by
/// normalized name are used. Empty input yields an empty sequence.
pub fn aggregate_daily(readings: &[Reading], block_filter: Option<&str>) -> Vec<DailyRecord> {
    let mut selected: Vec<&Reading> = readings
        .iter()
        .filter(|r| match block_filter {
            Some(block) => names_match(r.block.as_deref(), block),
            None => true,
        })
        .collect();

    if selected.is_empty() {
        info!(block = block_filter.unwrap_or("<any>"), "no readings to aggregate");
        return Vec::new();
    }
    selected.sort_by(|a, b| canonical_order(a, b));

    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for reading in selected {
        days.entry(reading.date()).or_default().push(reading);
    }

    days.into_iter()
        .filter_map(|(date, acc)| acc.finish(date))
        .collect()
}

/// Fetches, normalizes and aggregates one block's readings.
pub fn daily_for_block(
    source: &dyn ReadingSource,
    query: &BlockQuery,
    boundary: DayBoundary,
) -> anyhow::Result<Vec<DailyRecord>> {
    let raws = source.fetch_block_readings(query)?;
    let readings = normalize_readings(&raws, boundary);
    Ok(aggregate_daily(&readings, Some(&query.block)))
}

/// The last `n` records of an ascending sequence.
pub fn trailing(records: &[DailyRecord], n: usize) -> &[DailyRecord] {
    &records[records.len().saturating_sub(n)..]
}

pub fn is_date_ordered(records: &[DailyRecord]) -> bool {
    records.windows(2).all(|pair| pair[0].date < pair[1].date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawReading, RawValue};
    use crate::source::MemorySource;
    use chrono::{DateTime, FixedOffset};

    fn ts(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    fn reading(at: &str, level: f64) -> Reading {
        Reading {
            timestamp: ts(at),
            district: Some("Badaun".to_string()),
            block: Some("Ambiapur".to_string()),
            water_level: level,
            rainfall_mm: None,
            specific_yield: None,
            aquifer_type: None,
            quality: WaterQuality::default(),
        }
    }

    fn sample_day() -> Vec<Reading> {
        vec![
            Reading {
                rainfall_mm: Some(4.0),
                specific_yield: Some(10.0),
                aquifer_type: Some("Alluvium".to_string()),
                ..reading("2024-03-01T06:00:00Z", 10.0)
            },
            Reading {
                rainfall_mm: None,
                specific_yield: Some(30.0),
                aquifer_type: Some("Hard Rock".to_string()),
                ..reading("2024-03-01T18:00:00Z", 12.0)
            },
            Reading {
                rainfall_mm: Some(2.5),
                specific_yield: Some(14.0),
                quality: WaterQuality {
                    ph: Some(7.2),
                    ..WaterQuality::default()
                },
                ..reading("2024-03-01T12:00:00Z", 11.0)
            },
            reading("2024-03-03T00:00:00Z", 13.0),
        ]
    }

    #[test]
    fn groups_by_calendar_day_in_date_order() {
        let daily = aggregate_daily(&sample_day(), None);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(daily[1].date, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert!(is_date_ordered(&daily));

        let day = &daily[0];
        assert!((day.mean_level - 11.0).abs() < 1e-9);
        assert_eq!(day.rainfall_mm, Some(6.5));
        assert_eq!(day.yield_percent, Some(14.0));
        assert_eq!(day.aquifer_type.as_deref(), Some("Hard Rock"));
        assert_eq!(day.quality.ph, Some(7.2));
        assert_eq!(day.quality.ec, None);
        assert_eq!(day.reading_count, 3);
    }

    #[test]
    fn aquifer_type_survives_a_later_reading_without_one() {
        let readings = vec![
            reading("2024-03-04T09:00:00Z", 8.0),
            Reading {
                aquifer_type: Some("Alluvium".to_string()),
                ..reading("2024-03-04T05:00:00Z", 7.0)
            },
        ];
        let daily = aggregate_daily(&readings, None);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].aquifer_type.as_deref(), Some("Alluvium"));
    }

    #[test]
    fn rainfall_is_null_when_no_reading_carried_it() {
        let daily = aggregate_daily(&sample_day(), None);
        assert_eq!(daily[1].rainfall_mm, None);

        let dry = vec![
            Reading {
                rainfall_mm: Some(0.0),
                ..reading("2024-03-05T01:00:00Z", 9.0)
            },
            reading("2024-03-05T02:00:00Z", 9.5),
        ];
        let daily = aggregate_daily(&dry, None);
        assert_eq!(daily[0].rainfall_mm, Some(0.0));
    }

    #[test]
    fn any_input_order_gives_identical_output() {
        let forward = sample_day();
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(2);

        let expected = aggregate_daily(&forward, None);
        assert_eq!(aggregate_daily(&reversed, None), expected);
        assert_eq!(aggregate_daily(&rotated, None), expected);
        assert_eq!(aggregate_daily(&forward, None), expected);
    }

    #[test]
    fn block_filter_uses_normalized_names() {
        let mut readings = sample_day();
        readings.push(Reading {
            block: Some("Sahaswan".to_string()),
            ..reading("2024-03-02T00:00:00Z", 40.0)
        });

        let daily = aggregate_daily(&readings, Some("  AMBIAPUR "));
        assert_eq!(daily.len(), 2);
        assert!(aggregate_daily(&readings, Some("Unknown Block")).is_empty());
        assert!(aggregate_daily(&[], None).is_empty());
    }

    #[test]
    fn day_boundary_decides_which_date_a_reading_lands_on() {
        let raws = vec![RawReading {
            datetime_ts: Some("2024-03-01T20:00:00Z".to_string()),
            block: Some("Ambiapur".to_string()),
            water_level: Some(RawValue::from(10.0)),
            ..RawReading::default()
        }];
        let source = MemorySource::new(raws);
        let query = BlockQuery::new(None, "Ambiapur");

        let utc = daily_for_block(&source, &query, DayBoundary::utc()).unwrap();
        assert_eq!(utc[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let ist = DayBoundary::from_minutes(330).unwrap();
        let local = daily_for_block(&source, &query, ist).unwrap();
        assert_eq!(local[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn trailing_takes_the_most_recent_records() {
        let daily = aggregate_daily(&sample_day(), None);
        assert_eq!(trailing(&daily, 1)[0].date, daily[1].date);
        assert_eq!(trailing(&daily, 10).len(), 2);
        assert!(trailing(&daily, 0).is_empty());
    }
}
