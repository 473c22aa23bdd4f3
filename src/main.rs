use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod config;
mod daily;
mod db;
mod error;
mod fluctuation;
mod models;
mod normalize;
mod report;
mod scoring;
mod snapshot;
mod source;
mod stats;
mod yield_estimate;

use config::EngineConfig;
use error::EngineError;
use models::{DailyRecord, Fluctuation};
use scoring::ScoringPreset;
use source::{BlockQuery, CsvSource, MemorySource, ReadingSource};

#[derive(Parser)]
#[command(name = "groundwater-sustainability")]
#[command(about = "Daily summaries and sustainability scores for groundwater blocks", long_about = None)]
struct Cli {
    /// Read readings from a CSV export instead of the database
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    /// JSON engine configuration (preset, weights, thresholds, day boundary)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct BlockArgs {
    #[arg(long)]
    district: Option<String>,
    #[arg(long)]
    block: String,
    /// Maximum raw readings to fetch
    #[arg(long, default_value_t = 1000)]
    limit: usize,
}

impl BlockArgs {
    fn query(&self) -> BlockQuery {
        BlockQuery::new(self.district.as_deref(), &self.block).with_limit(self.limit)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import readings from a groundwater CSV export
    Import {
        #[arg(long)]
        csv_file: PathBuf,
    },
    /// List districts with readings
    Districts,
    /// List blocks of a district
    Blocks {
        #[arg(long)]
        district: String,
    },
    /// Find the district(s) a block belongs to
    DistrictOf {
        #[arg(long)]
        block: String,
    },
    /// List every block with its district(s)
    BlockMap,
    /// Show daily summaries for a block
    Daily {
        #[command(flatten)]
        block: BlockArgs,
        #[arg(long, default_value_t = 10)]
        days: usize,
    },
    /// Day-over-day change in mean water level
    Fluctuation {
        #[command(flatten)]
        block: BlockArgs,
    },
    /// Sustainability score for a block
    Score {
        #[command(flatten)]
        block: BlockArgs,
        #[arg(long, default_value_t = 60)]
        days: usize,
        /// Overrides the preset from the config file
        #[arg(long, value_enum)]
        preset: Option<ScoringPreset>,
        #[arg(long)]
        json: bool,
    },
    /// Estimated irrigable area from specific yield
    Yield {
        #[command(flatten)]
        block: BlockArgs,
        #[arg(long, default_value_t = 30)]
        days: usize,
        #[arg(long, default_value_t = yield_estimate::DEFAULT_AREA_HA)]
        area_ha: f64,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        block: BlockArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set, or pass --csv to read a file")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_daily(
    cli_csv: Option<&PathBuf>,
    args: &BlockArgs,
    config: &EngineConfig,
) -> anyhow::Result<Vec<DailyRecord>> {
    let query = args.query();
    let source: Box<dyn ReadingSource> = match cli_csv {
        Some(path) => Box::new(CsvSource::new(path)),
        None => {
            let pool = connect().await?;
            Box::new(MemorySource::new(db::fetch_block_readings(&pool, &query).await?))
        }
    };
    daily::daily_for_block(source.as_ref(), &query, config.day_boundary()?)
}

fn print_none(kind: &str, err: &EngineError) {
    println!("No {kind} available: {err}.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv_file } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv_file, config.day_boundary()?).await?;
            println!("Inserted {inserted} readings from {}.", csv_file.display());
        }
        Commands::Districts => {
            let pool = connect().await?;
            for district in db::list_districts(&pool).await? {
                println!("{district}");
            }
        }
        Commands::Blocks { district } => {
            let pool = connect().await?;
            let blocks = db::list_blocks(&pool, &district).await?;
            if blocks.is_empty() {
                println!("No blocks found for {district}.");
            }
            for block in blocks {
                println!("{block}");
            }
        }
        Commands::DistrictOf { block } => {
            let pool = connect().await?;
            let districts = db::district_for_block(&pool, &block).await?;
            if districts.is_empty() {
                println!("No district found for block {block}.");
            }
            for district in districts {
                println!("{district}");
            }
        }
        Commands::BlockMap => {
            let pool = connect().await?;
            for (block, districts) in db::block_districts(&pool).await? {
                let districts: Vec<&str> = districts.iter().map(String::as_str).collect();
                println!("{block}: {}", districts.join(", "));
            }
        }
        Commands::Daily { block, days } => {
            let daily = load_daily(cli.csv.as_ref(), &block, &config).await?;
            if daily.is_empty() {
                println!("No readings found for this block.");
                return Ok(());
            }
            let changes = fluctuation::daily_changes(&daily);
            let start = daily.len().saturating_sub(days);
            for (record, change) in daily.iter().zip(&changes).skip(start) {
                println!(
                    "{} level {:.2} m, change {}, rain {}, yield {}, aquifer {}",
                    record.date,
                    record.mean_level,
                    change
                        .delta_h_m
                        .map_or("n/a".to_string(), |d| format!("{d:+.3} m")),
                    record
                        .rainfall_mm
                        .map_or("n/a".to_string(), |r| format!("{r:.1} mm")),
                    record
                        .yield_percent
                        .map_or("n/a".to_string(), |y| format!("{y:.1}")),
                    record.aquifer_type.as_deref().unwrap_or("Unknown"),
                );
            }
        }
        Commands::Fluctuation { block } => {
            let daily = load_daily(cli.csv.as_ref(), &block, &config).await?;
            match fluctuation::compute_fluctuation(&daily) {
                Fluctuation::Change(change) => println!(
                    "{}: {:+.3} m across {} days of data",
                    change.last_date, change.delta, change.records_used
                ),
                Fluctuation::InsufficientData { records_used } => {
                    println!("Not enough daily data ({records_used} days).")
                }
            }
        }
        Commands::Score {
            block,
            days,
            preset,
            json,
        } => {
            if let Some(preset) = preset {
                config.preset = preset;
            }
            let daily = load_daily(cli.csv.as_ref(), &block, &config).await?;
            let weights = config.weights();
            let thresholds = config.thresholds();
            let result = scoring::compute_score(
                daily::trailing(&daily, days),
                Some(&weights),
                Some(&thresholds),
            );
            match result {
                Ok(score) if json => println!("{}", serde_json::to_string_pretty(&score)?),
                Ok(score) => {
                    println!("Sustainability score {:.2}%", score.final_score_pct);
                    for (factor, value, weight) in score.components() {
                        println!("- {factor}: {value:.3} (weight {weight:.2})");
                    }
                    if let Some(factor) = score.weakest_factor() {
                        println!("Largest drag: {factor}");
                    }
                }
                Err(err @ (EngineError::InsufficientData { .. } | EngineError::NoData)) => {
                    print_none("score", &err)
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Yield {
            block,
            days,
            area_ha,
        } => {
            let daily = load_daily(cli.csv.as_ref(), &block, &config).await?;
            match yield_estimate::estimate_yield(&daily, area_ha, days) {
                Ok(estimate) => println!(
                    "Estimated irrigated area {:.2} ha ({:.2} m3 available over {} days)",
                    estimate.irrigated_area_ha, estimate.available_volume_m3, estimate.days_used
                ),
                Err(err @ EngineError::NoData) => print_none("yield data", &err),
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Report { block, out } => {
            let daily = load_daily(cli.csv.as_ref(), &block, &config).await?;
            let report =
                report::build_report(block.district.as_deref(), &block.block, &daily, &config);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
