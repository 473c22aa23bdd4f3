//! Raw row to `Reading` conversion.
//!
//! Rows that cannot be placed in time or carry no water level are
//! classified as `MalformedReading` and dropped from the batch; every other
//! field is coerced leniently (non-numeric text becomes missing).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DayBoundary;
use crate::models::{RawReading, RawValue, Reading, WaterQuality};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedReading {
    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("unparsable timestamp: {0}")]
    UnparsableTimestamp(String),

    #[error("missing water level")]
    MissingWaterLevel,

    #[error("non-numeric water level: {0}")]
    NonNumericWaterLevel(String),
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Parses a timestamp and expresses it in the boundary's offset.
pub fn parse_timestamp(
    text: &str,
    boundary: DayBoundary,
) -> Result<DateTime<FixedOffset>, MalformedReading> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MalformedReading::MissingTimestamp);
    }
    let offset = boundary.offset();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&offset));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Ok(parsed.with_timezone(&offset));
        }
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| MalformedReading::UnparsableTimestamp(text.to_string()))?;

    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| MalformedReading::UnparsableTimestamp(text.to_string()))
}

/// Coerces a raw value to a finite number; anything else is missing.
pub fn coerce_number(value: Option<&RawValue>) -> Option<f64> {
    let number = match value? {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => text.trim().parse::<f64>().ok()?,
    };
    number.is_finite().then_some(number)
}

fn clean_text(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn normalize_reading(
    raw: &RawReading,
    boundary: DayBoundary,
) -> Result<Reading, MalformedReading> {
    let timestamp = match raw.datetime_ts.as_deref() {
        Some(text) => parse_timestamp(text, boundary)?,
        None => return Err(MalformedReading::MissingTimestamp),
    };

    let water_level = match raw.water_level.as_ref() {
        None => return Err(MalformedReading::MissingWaterLevel),
        Some(RawValue::Text(text)) if text.trim().is_empty() => {
            return Err(MalformedReading::MissingWaterLevel)
        }
        Some(value) => coerce_number(Some(value)).ok_or_else(|| {
            let shown = match value {
                RawValue::Number(n) => n.to_string(),
                RawValue::Text(t) => t.clone(),
            };
            MalformedReading::NonNumericWaterLevel(shown)
        })?,
    };

    Ok(Reading {
        timestamp,
        district: clean_text(raw.district.as_ref()),
        block: clean_text(raw.block.as_ref()),
        water_level,
        rainfall_mm: coerce_number(raw.rainfall_mm.as_ref()),
        specific_yield: coerce_number(raw.specific_yield.as_ref()),
        aquifer_type: clean_text(raw.aquifer_type.as_ref()),
        quality: WaterQuality {
            ph: coerce_number(raw.wq_ph.as_ref()),
            ec: coerce_number(raw.wq_ec.as_ref()),
            cl: coerce_number(raw.wq_cl.as_ref()),
            f: coerce_number(raw.wq_f.as_ref()),
            total_hardness: coerce_number(raw.wq_total_hardness.as_ref()),
        },
    })
}

/// Normalizes a batch, dropping malformed rows.
pub fn normalize_readings(raws: &[RawReading], boundary: DayBoundary) -> Vec<Reading> {
    let mut readings = Vec::with_capacity(raws.len());
    let mut dropped = 0usize;

    for (index, raw) in raws.iter().enumerate() {
        match normalize_reading(raw, boundary) {
            Ok(reading) => readings.push(reading),
            Err(reason) => {
                debug!(row = index, %reason, "dropping malformed reading");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = readings.len(), "malformed readings dropped");
    }
    readings
}

/// Canonical form used to compare block and district names.
///
/// Lowercases, collapses runs of whitespace and punctuation to a single
/// space, then title-cases each word: `"ambia_pur  BLOCK"` becomes
/// `"Ambia Pur Block"`.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let words = lowered
        .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty());

    let mut out = String::with_capacity(name.len());
    for word in words {
        if !out.is_empty() {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

pub fn names_match(candidate: Option<&str>, wanted: &str) -> bool {
    candidate.is_some_and(|c| normalize_name(c) == normalize_name(wanted))
}

/// Converts a specific-yield value to a fraction.
///
/// Values above 1 are read as percentages; values at or below 1 are
/// already fractions, so exactly 1.0 means 100 %, not 1 %. Upstream
/// sources do not say which scale they use, so this stays a heuristic.
pub fn specific_yield_fraction(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}
