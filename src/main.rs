use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Days, Duration, FixedOffset, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use trend_radar::{
    backfill, notify, report, rollup, AppConfig, CooldownTracker, FeatureRecord,
    InMemoryAlertHistory, NotificationPlanner, RollupAggregator, Severity, SignalDetector,
    SnapshotRow,
};

mod db;

#[derive(Parser)]
#[command(name = "trend-radar")]
#[command(about = "Search-interest signal detection and alert routing", long_about = None)]
struct Cli {
    /// Configuration file path (can also be set via TREND_RADAR_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import daily series points (term, geo, date, value) from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify every stored series and persist the day's features
    Detect {
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Record an hourly snapshot of today's strongest features
    Snapshot {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Aggregate a day's snapshots and write a markdown report
    Rollup {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "rollup.md")]
        out: PathBuf,
    },
    /// Plan alerts for a day's features and write payloads as JSON lines
    Notify {
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replay the detector over stored history and export the signals as CSV
    Backfill {
        /// Reporting window, in 30-day months
        #[arg(long, default_value_t = 3)]
        months: u64,
        /// Extra history loaded before the window for the baseline
        #[arg(long, default_value_t = 70)]
        warmup_days: u64,
        /// Comma-separated tiers to keep
        #[arg(long, default_value = "RISING,BREAKOUT")]
        severity: String,
        #[arg(long, default_value = "backfill_events.csv")]
        out: PathBuf,
    },
}

fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    trend_radar::logging::init_logging();

    let config_path = cli
        .config
        .or_else(|| std::env::var("TREND_RADAR_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = AppConfig::load(&config_path)?;
    let offset = config
        .reporting_offset()
        .context("reporting_utc_offset_hours is out of range")?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let upserted = db::import_csv(&pool, &csv).await?;
            println!("Upserted {upserted} series points from {}.", csv.display());
        }
        Commands::Detect { as_of, limit } => {
            let as_of = as_of.unwrap_or_else(|| today(offset));
            let since = as_of - Duration::days(config.series_lookback_days);
            let series = db::fetch_series(&pool, since, as_of).await?;

            let detector = SignalDetector::new(config.detector.clone());
            let mut features: Vec<FeatureRecord> = Vec::new();
            for ((term, geo), points) in series.iter() {
                let Some(signal) = detector.detect(points, term, geo) else {
                    continue;
                };
                let feature = FeatureRecord::from_signal(signal, as_of);
                db::upsert_feature(&pool, &feature).await?;
                features.push(feature);
            }

            info!(
                %as_of,
                series = series.len(),
                signals = features.len(),
                "detection run complete"
            );
            print!("{}", report::build_detection_summary(as_of, &features, limit));
        }
        Commands::Snapshot { limit } => {
            let snapshot_at = rollup::snapshot_hour(Utc::now());
            let features = db::fetch_features(&pool, today(offset)).await?;
            let rows: Vec<SnapshotRow> =
                report::top_features(&features, &Severity::ALL, 2.0, true, limit)
                    .into_iter()
                    .map(SnapshotRow::from)
                    .collect();

            let snapshot_id = db::upsert_snapshot(&pool, snapshot_at, &rows).await?;
            info!(%snapshot_id, %snapshot_at, rows = rows.len(), "snapshot stored");
            println!("Snapshot {snapshot_at} stored with {} rows.", rows.len());
        }
        Commands::Rollup { date, out } => {
            let date = date.unwrap_or_else(|| today(offset));
            let bounds = rollup::day_bounds(date, offset).context("invalid report date")?;
            let snapshots = db::fetch_snapshots(&pool, bounds).await?;

            let daily = RollupAggregator::new(config.rollup).aggregate(date, offset, &snapshots);
            db::upsert_daily_rollup(&pool, &daily).await?;
            std::fs::write(&out, report::build_rollup_report(&daily))?;
            println!("Rollup for {date} written to {}.", out.display());
        }
        Commands::Notify { as_of, out } => {
            let as_of = as_of.unwrap_or_else(|| today(offset));
            let now = Utc::now();
            let features = db::fetch_features(&pool, as_of).await?;

            let day_start = rollup::day_bounds(as_of, offset)
                .context("invalid as-of date")?
                .start;
            let longest_cooldown = Severity::ALL
                .iter()
                .map(|s| config.cooldown.window_for(*s))
                .max()
                .unwrap_or_else(Duration::zero);
            let since = (day_start - Duration::days(config.quality.lookback_days))
                .min(now - longest_cooldown);

            let mut tx = pool.begin().await?;
            db::lock_alerts(&mut *tx).await?;
            let history = InMemoryAlertHistory::from_records(
                db::fetch_alerts_since(&mut *tx, since).await?,
            );

            let mut tracker = CooldownTracker::new(config.cooldown, history);
            let planner = NotificationPlanner::new(config.notify.clone(), config.quality, offset);
            let planned = planner.plan(&features, &mut tracker, now);

            let mut sink: Box<dyn Write> = match &out {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout()),
            };
            let lines = notify::outbox_lines(&planned)?;
            for alert in planned.iter() {
                db::insert_alert(&mut *tx, &alert.record).await?;
            }
            tx.commit().await?;

            // Only payloads whose alert records are committed leave the process.
            for (alert, line) in planned.iter().zip(lines.iter()) {
                writeln!(sink, "{line}")?;
                info!(alert = %alert.payload.headline(), "alert emitted");
            }
            sink.flush()?;

            info!(%as_of, alerts = planned.len(), "notification run complete");
        }
        Commands::Backfill {
            months,
            warmup_days,
            severity,
            out,
        } => {
            let severities = severity
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<Severity>)
                .collect::<Result<Vec<_>, _>>()?;

            let report_end = today(offset);
            let report_start = report_end
                .checked_sub_days(Days::new(months.saturating_mul(30)))
                .context("--months reaches past the supported date range")?;
            let pull_start = report_start
                .checked_sub_days(Days::new(warmup_days))
                .context("--warmup-days reaches past the supported date range")?;

            let series = db::fetch_series(&pool, pull_start, report_end).await?;
            let detector = SignalDetector::new(config.detector.clone());
            let events = backfill::backfill_events(&detector, &series, report_start, &severities);

            if events.is_empty() {
                println!("No events found in the window.");
                return Ok(());
            }

            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            backfill::write_csv(&events, file)?;

            info!(%report_start, %report_end, events = events.len(), "backfill exported");
            println!("Saved {} events to {}.", events.len(), out.display());
            for event in events.iter().take(20) {
                println!(
                    "{} {} | {} | {} (z {:.2}, WoW {:+.0}%)",
                    event.as_of_date,
                    event.severity,
                    event.geo,
                    event.term,
                    event.z_score,
                    event.wow_change * 100.0
                );
            }
        }
    }

    Ok(())
}
