use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod classify;
mod config;
mod db;
mod error;
mod ingest;
mod models;
mod pipeline;
mod report;
mod scan;
mod schedule;
mod snapshot;
mod trend;

use crate::config::Config;
use crate::db::Store;
use crate::error::IngestError;
use crate::models::SeriesFilter;
use crate::pipeline::Pipeline;
use crate::scan::ScanConfig;
use crate::snapshot::GitSnapshotter;
use crate::trend::TrendConfig;

#[derive(Parser)]
#[command(name = "skipped-tests")]
#[command(about = "Tracks skipped and flaky tests per branch over time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load 30 days of demo history for master and develop
    Seed,
    /// Import daily summaries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Clone or update the repository, count skipped tests and record today's summary
    Fetch {
        #[arg(long, default_value = "master")]
        branch: String,
    },
    /// Count skipped tests in an existing checkout, optionally recording the result
    Scan {
        path: PathBuf,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Record an externally computed summary given as JSON
    #[command(group(
        ArgGroup::new("source")
            .args(["payload", "file"])
            .required(true)
            .multiple(false)
    ))]
    Ingest {
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print stored summaries as JSON, oldest first
    Series {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Print the branches that have summaries
    Branches,
    /// Print today's counts, the 7-day average and the trend
    Summary {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the dashboard data.json document
    Export {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "data.json")]
        out: PathBuf,
    },
    /// Fetch every configured branch once a day
    Schedule {
        /// Comma separated; defaults to FETCH_BRANCHES
        #[arg(long)]
        branches: Option<String>,
        /// HH:MM local time; defaults to FETCH_AT
        #[arg(long)]
        at: Option<String>,
        /// Also fetch immediately on startup
        #[arg(long)]
        run_now: bool,
    },
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn snapshotter(config: &Config) -> GitSnapshotter {
    GitSnapshotter::new(&config.repo, &config.cache_dir)
        .with_remote_base(config.remote_base.as_str())
        .with_auth_token(config.gh_token.clone())
        .with_timeout(config.git_timeout)
        .with_layout(config.checkout_layout)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = Store::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    store.init().await.context("failed to prepare schema")?;

    let trend_config = TrendConfig {
        threshold: config.trend_threshold,
    };
    let mut exit = ExitCode::SUCCESS;

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = store.seed(&config.repo_label, Utc::now().date_naive()).await?;
            println!("Seeded {inserted} daily summaries.");
        }
        Commands::Import { csv } => {
            let imported = ingest::import_csv(&store, &csv, &config.repo_label).await?;
            println!("Imported {imported} summaries from {}.", csv.display());
        }
        Commands::Fetch { branch } => {
            let pipeline = Pipeline::new(
                snapshotter(&config),
                store.clone(),
                ScanConfig::default(),
                config.repo_label.clone(),
            );
            let outcome = pipeline
                .run_fetch(&branch)
                .await
                .with_context(|| format!("fetch failed for {branch}"))?;
            print_json(&json!({
                "ok": true,
                "date": outcome.date,
                "branch": outcome.branch,
                "total_tests": outcome.total_tests,
                "skipped_count": outcome.skipped_count,
            }))?;
        }
        Commands::Scan { path, branch } => {
            let result = scan::scan(&path, &ScanConfig::default())?;
            let today = Utc::now().date_naive();
            let label = branch.as_deref().unwrap_or("-");
            for line in report::scan_summary_lines(today, label, &result) {
                println!("{line}");
            }
            if let Some(branch) = branch {
                pipeline::record_scan(&store, &config.repo_label, &branch, today, &result).await?;
                println!("Recorded {today} / {branch}.");
            }
        }
        Commands::Ingest { payload, file } => {
            let raw = match (payload, file) {
                (Some(payload), _) => payload,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                (None, None) => anyhow::bail!("either --payload or --file is required"),
            };
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("payload is not valid JSON")?;

            match ingest::ingest_payload(&store, &value, &config.repo_label).await {
                Ok(summary) => print_json(&json!({
                    "ok": true,
                    "message": format!("Upserted {} / {}", summary.date, summary.branch),
                }))?,
                Err(IngestError::Validation(errors)) => {
                    print_json(&json!({
                        "error": "Validation failed",
                        "details": errors.details,
                    }))?;
                    exit = ExitCode::from(2);
                }
                Err(IngestError::Store(e)) => return Err(e).context("failed to store summary"),
            }
        }
        Commands::Series { branch, from, to } => {
            let series = store
                .time_series(&SeriesFilter {
                    branch: branch.as_deref(),
                    from,
                    to,
                })
                .await?;
            print_json(&series)?;
        }
        Commands::Branches => {
            print_json(&store.distinct_branches().await?)?;
        }
        Commands::Summary { branch } => {
            let summary = trend::compute_trend(&store, branch.as_deref(), &trend_config).await?;
            print_json(&summary)?;
        }
        Commands::Report {
            branch,
            since_days,
            out,
        } => {
            let cutoff = Utc::now().date_naive() - Duration::days(since_days.max(1));
            let series = store
                .time_series(&SeriesFilter {
                    branch: branch.as_deref(),
                    from: Some(cutoff),
                    to: None,
                })
                .await?;
            let summary = trend::compute_trend(&store, branch.as_deref(), &trend_config).await?;
            let report = report::build_report(branch.as_deref(), cutoff, &series, &summary);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { branch, out } => {
            let series = store
                .time_series(&SeriesFilter {
                    branch: branch.as_deref(),
                    ..Default::default()
                })
                .await?;
            let export = report::build_export(&config.repo_label, &series);
            std::fs::write(&out, serde_json::to_string_pretty(&export)? + "\n")?;
            println!("Exported {} entries to {}.", export.entries.len(), out.display());
        }
        Commands::Schedule {
            branches,
            at,
            run_now,
        } => {
            let branches = branches
                .map(|value| config::split_branches(&value))
                .unwrap_or_else(|| config.fetch_branches.clone());
            let at = match at {
                Some(value) => schedule::parse_time_of_day(&value).context("--at must be HH:MM")?,
                None => config.fetch_at,
            };
            let pipeline = Pipeline::new(
                snapshotter(&config),
                store.clone(),
                ScanConfig::default(),
                config.repo_label.clone(),
            );
            schedule::run_daily(&pipeline, &branches, at, run_now).await?;
        }
    }

    store.close().await;
    Ok(exit)
}
