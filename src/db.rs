use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DayBoundary;
use crate::models::{RawReading, RawValue};
use crate::normalize::{coerce_number, normalize_name, parse_timestamp};
use crate::source::{read_csv_rows, BlockQuery, CsvRow};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn numeric(value: &Option<String>) -> Option<f64> {
    coerce_number(value.as_deref().map(RawValue::from).as_ref())
}

fn source_key(row: &CsvRow, timestamp: Option<DateTime<Utc>>) -> String {
    match (row.well_id.as_deref().map(str::trim), timestamp) {
        (Some(well), Some(ts)) if !well.is_empty() => format!("{well}@{}", ts.to_rfc3339()),
        _ => format!("import-{}", Uuid::new_v4()),
    }
}

/// Bulk-loads a groundwater CSV export. Rows already imported are skipped.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    boundary: DayBoundary,
) -> anyhow::Result<usize> {
    let rows = read_csv_rows(csv_path)?;
    let mut inserted = 0usize;
    let mut unparsed = 0usize;

    for row in &rows {
        let timestamp = row
            .datetime
            .as_deref()
            .and_then(|text| parse_timestamp(text, boundary).ok())
            .map(|ts| ts.with_timezone(&Utc));
        if timestamp.is_none() {
            unparsed += 1;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO groundwater.readings
            (id, source_key, datetime_raw, datetime_ts, water_level, barometric,
             state, district, block, site_name, well_id, latitude, longitude,
             rainfall_mm, wq_distance_km, wq_ph, wq_ec, wq_cl, wq_f,
             wq_total_hardness, aquifer_type, specific_yield)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(source_key(row, timestamp))
        .bind(&row.datetime)
        .bind(timestamp)
        .bind(numeric(&row.water_level))
        .bind(numeric(&row.barometric))
        .bind(&row.state)
        .bind(&row.district)
        .bind(&row.block)
        .bind(&row.site_name)
        .bind(&row.well_id)
        .bind(numeric(&row.latitude))
        .bind(numeric(&row.longitude))
        .bind(numeric(&row.rainfall_mm))
        .bind(numeric(&row.wq_distance_km))
        .bind(numeric(&row.wq_ph))
        .bind(numeric(&row.wq_ec))
        .bind(numeric(&row.wq_cl))
        .bind(numeric(&row.wq_f))
        .bind(numeric(&row.wq_total_hardness))
        .bind(&row.aquifer_type)
        .bind(numeric(&row.specific_yield))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    if unparsed > 0 {
        warn!(unparsed, "imported rows without a usable timestamp");
    }
    info!(total = rows.len(), inserted, "csv import finished");
    Ok(inserted)
}

fn distinct_names(names: impl IntoIterator<Item = Option<String>>) -> Vec<String> {
    names
        .into_iter()
        .flatten()
        .map(|name| normalize_name(&name))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// SQL expression reducing a name column to the same key as [`name_key`].
fn sql_name_key(column: &str) -> String {
    format!("lower(btrim(regexp_replace({column}, '[[:space:][:punct:]]+', ' ', 'g')))")
}

/// Lowercased canonical name, matched with `=` against [`sql_name_key`].
fn name_key(name: &str) -> String {
    normalize_name(name).to_lowercase()
}

/// Pairs every block with the districts it was recorded under.
fn group_block_districts(
    rows: impl IntoIterator<Item = (Option<String>, Option<String>)>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (block, district) in rows {
        let (Some(block), Some(district)) = (block, district) else {
            continue;
        };
        let (block, district) = (normalize_name(&block), normalize_name(&district));
        if block.is_empty() || district.is_empty() {
            continue;
        }
        grouped.entry(block).or_default().insert(district);
    }
    grouped
}

pub async fn list_districts(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query("SELECT DISTINCT district FROM groundwater.readings")
        .fetch_all(pool)
        .await?;
    Ok(distinct_names(rows.iter().map(|row| row.get::<Option<String>, _>("district"))))
}

pub async fn list_blocks(pool: &PgPool, district: &str) -> anyhow::Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT block FROM groundwater.readings WHERE {} = $1",
        sql_name_key("district")
    );
    let rows = sqlx::query(&sql)
        .bind(name_key(district))
        .fetch_all(pool)
        .await?;
    Ok(distinct_names(rows.iter().map(|row| row.get::<Option<String>, _>("block"))))
}

/// Every block with the districts it appears under.
pub async fn block_districts(pool: &PgPool) -> anyhow::Result<BTreeMap<String, BTreeSet<String>>> {
    let rows = sqlx::query(
        "SELECT DISTINCT block, district FROM groundwater.readings \
         WHERE block IS NOT NULL AND district IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;
    Ok(group_block_districts(rows.iter().map(|row| {
        (
            row.get::<Option<String>, _>("block"),
            row.get::<Option<String>, _>("district"),
        )
    })))
}

/// Districts a block name is recorded under; usually exactly one.
pub async fn district_for_block(pool: &PgPool, block: &str) -> anyhow::Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT district FROM groundwater.readings WHERE {} = $1",
        sql_name_key("block")
    );
    let rows = sqlx::query(&sql)
        .bind(name_key(block))
        .fetch_all(pool)
        .await?;
    Ok(distinct_names(rows.iter().map(|row| row.get::<Option<String>, _>("district"))))
}

/// Most recent readings for a block, newest first.
///
/// Names are matched on their canonical form in SQL, so the limit counts
/// only rows of the requested block.
pub async fn fetch_block_readings(
    pool: &PgPool,
    query: &BlockQuery,
) -> anyhow::Result<Vec<RawReading>> {
    let mut sql = format!(
        "SELECT datetime_ts, district, block, water_level, rainfall_mm, specific_yield, \
         aquifer_type, wq_ph, wq_ec, wq_cl, wq_f, wq_total_hardness \
         FROM groundwater.readings \
         WHERE {} = $1",
        sql_name_key("block")
    );
    if query.district.is_some() {
        sql.push_str(&format!(" AND {} = $3", sql_name_key("district")));
    }
    sql.push_str(" ORDER BY datetime_ts DESC NULLS LAST LIMIT $2");

    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let mut rows = sqlx::query(&sql).bind(name_key(&query.block)).bind(limit);
    if let Some(district) = query.district.as_deref() {
        rows = rows.bind(name_key(district));
    }

    let records = rows.fetch_all(pool).await?;
    let number = |value: Option<f64>| value.map(RawValue::Number);

    let mut readings = Vec::with_capacity(records.len());
    for row in records {
        readings.push(RawReading {
            datetime_ts: row
                .get::<Option<DateTime<Utc>>, _>("datetime_ts")
                .map(|ts| ts.to_rfc3339()),
            district: row.get("district"),
            block: row.get("block"),
            water_level: number(row.get("water_level")),
            rainfall_mm: number(row.get("rainfall_mm")),
            specific_yield: number(row.get("specific_yield")),
            aquifer_type: row.get("aquifer_type"),
            wq_ph: number(row.get("wq_ph")),
            wq_ec: number(row.get("wq_ec")),
            wq_cl: number(row.get("wq_cl")),
            wq_f: number(row.get("wq_f")),
            wq_total_hardness: number(row.get("wq_total_hardness")),
        });
    }

    Ok(readings)
}
