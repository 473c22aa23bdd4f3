use std::borrow::Cow;

use crate::daily::is_date_ordered;
use crate::models::{DailyChange, DailyRecord, Fluctuation, FluctuationResult};
use crate::stats::round_to;

pub(crate) fn sorted_by_date(records: &[DailyRecord]) -> Cow<'_, [DailyRecord]> {
    if is_date_ordered(records) {
        Cow::Borrowed(records)
    } else {
        let mut owned = records.to_vec();
        owned.sort_by_key(|r| r.date);
        Cow::Owned(owned)
    }
}

/// Change in mean level between the last two recorded days.
pub fn compute_fluctuation(records: &[DailyRecord]) -> Fluctuation {
    let records = sorted_by_date(records);
    match records.as_ref() {
        [.., previous, latest] => Fluctuation::Change(FluctuationResult {
            last_date: latest.date,
            delta: round_to(latest.mean_level - previous.mean_level, 3),
            records_used: records.len(),
        }),
        _ => Fluctuation::InsufficientData {
            records_used: records.len(),
        },
    }
}

/// Per-day change from the previous record, with its recharge-equivalent in mm.
pub fn daily_changes(records: &[DailyRecord]) -> Vec<DailyChange> {
    let records = sorted_by_date(records);
    let mut previous: Option<f64> = None;

    records
        .iter()
        .map(|record| {
            let delta = previous
                .filter(|p| p.is_finite() && record.mean_level.is_finite())
                .map(|p| record.mean_level - p);
            previous = Some(record.mean_level);
            DailyChange {
                date: record.date,
                mean_level: record.mean_level,
                delta_h_m: delta,
                delta_h_eq_mm: delta.map(|d| d * -1000.0),
            }
        })
        .collect()
}
