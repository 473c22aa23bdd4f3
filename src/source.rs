use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::{RawReading, RawValue};
use crate::normalize::names_match;

/// Which block's readings to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockQuery {
    pub district: Option<String>,
    pub block: String,
    /// Most recent rows to keep.
    pub limit: usize,
}

impl BlockQuery {
    pub fn new(district: Option<&str>, block: &str) -> Self {
        Self {
            district: district.map(str::to_string),
            block: block.to_string(),
            limit: 1000,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, row: &RawReading) -> bool {
        let district_ok = match self.district.as_deref() {
            Some(district) => names_match(row.district.as_deref(), district),
            None => true,
        };
        district_ok && names_match(row.block.as_deref(), &self.block)
    }
}

/// Supplies the raw reading stream for one block.
///
/// Implementations return at most `query.limit` rows, favouring the most
/// recent ones. Ordering is not relied upon: the aggregator orders by
/// timestamp itself.
pub trait ReadingSource {
    fn fetch_block_readings(&self, query: &BlockQuery) -> anyhow::Result<Vec<RawReading>>;
}

/// Rows already held in memory, e.g. fetched from the database.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<RawReading>,
}

impl MemorySource {
    pub fn new(rows: Vec<RawReading>) -> Self {
        Self { rows }
    }
}

impl ReadingSource for MemorySource {
    fn fetch_block_readings(&self, query: &BlockQuery) -> anyhow::Result<Vec<RawReading>> {
        let matching: Vec<&RawReading> = self.rows.iter().filter(|r| query.matches(r)).collect();
        let skip = matching.len().saturating_sub(query.limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }
}

/// A groundwater CSV export, assumed to be in chronological order.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

/// Column layout shared by the CSV source and the database import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvRow {
    #[serde(alias = "datetime_ts")]
    pub datetime: Option<String>,
    pub water_level: Option<String>,
    pub barometric: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub site_name: Option<String>,
    pub well_id: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub rainfall_mm: Option<String>,
    pub wq_distance_km: Option<String>,
    pub wq_ph: Option<String>,
    pub wq_ec: Option<String>,
    pub wq_cl: Option<String>,
    pub wq_f: Option<String>,
    pub wq_total_hardness: Option<String>,
    pub aquifer_type: Option<String>,
    pub specific_yield: Option<String>,
}

impl CsvRow {
    pub fn to_raw(&self) -> RawReading {
        let text = |v: &Option<String>| v.as_deref().map(RawValue::from);
        RawReading {
            datetime_ts: self.datetime.clone(),
            district: self.district.clone(),
            block: self.block.clone(),
            water_level: text(&self.water_level),
            rainfall_mm: text(&self.rainfall_mm),
            specific_yield: text(&self.specific_yield),
            aquifer_type: self.aquifer_type.clone(),
            wq_ph: text(&self.wq_ph),
            wq_ec: text(&self.wq_ec),
            wq_cl: text(&self.wq_cl),
            wq_f: text(&self.wq_f),
            wq_total_hardness: text(&self.wq_total_hardness),
        }
    }
}

pub fn read_csv_rows(path: &Path) -> anyhow::Result<Vec<CsvRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad CSV record {} in {}", index + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReadingSource for CsvSource {
    fn fetch_block_readings(&self, query: &BlockQuery) -> anyhow::Result<Vec<RawReading>> {
        let rows: Vec<RawReading> = read_csv_rows(&self.path)?
            .iter()
            .map(CsvRow::to_raw)
            .collect();
        MemorySource::new(rows).fetch_block_readings(query)
    }
}
