//! Tripwire CLI
//!
//! Command-line interface for checking a Tripwire configuration and
//! replaying captured exceptions through the notification pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tripwire::config::{LoggingConfig, StoreBackend};
use tripwire::db::RedisStore;
use tripwire::grouping::send_notification;
use tripwire::models::{ExceptionRecord, NotifyOptions};
use tripwire::{Config, ExceptionNotifier};

/// Tripwire - exception notifications with error grouping
#[derive(Parser)]
#[command(name = "tripwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TRIPWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and show the resulting setup
    Check,

    /// Run JSON-lines exception records through the notifier
    Replay {
        /// Input file (stdin if not specified)
        file: Option<PathBuf>,
    },

    /// Show which occurrence counts the default policy notifies on
    Policy {
        /// Highest count to evaluate
        #[arg(long, default_value = "1000")]
        up_to: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Pick up a .env file before the environment is read
    dotenvy::dotenv().ok();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Check => run_check(&config, cli.format).await,
        Commands::Replay { file } => run_replay(&config, file, cli.format).await,
        Commands::Policy { up_to } => {
            run_policy(up_to, cli.format);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[derive(Debug, Serialize)]
struct CheckReport {
    notifiers: Vec<String>,
    ignored_exceptions: Vec<String>,
    grouping_enabled: bool,
    #[serde(with = "humantime_serde")]
    grouping_period: std::time::Duration,
    store: StoreBackend,
    testing_mode: bool,
}

async fn run_check(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let notifier = ExceptionNotifier::from_config(config)
        .await
        .context("failed to build exception notifier")?;

    if config.grouping.enabled && config.store.backend == StoreBackend::Redis {
        let store = RedisStore::new(&config.store.redis).await?;
        store
            .health_check()
            .await
            .with_context(|| format!("redis at {} is unreachable", config.store.redis.url))?;
        info!(url = %config.store.redis.url, "Redis counter store reachable");
    }

    let report = CheckReport {
        notifiers: notifier.notifier_names(),
        ignored_exceptions: notifier.evaluator().ignored_exceptions(),
        grouping_enabled: notifier.grouping().is_some(),
        grouping_period: config.grouping.period,
        store: config.store.backend,
        testing_mode: config.testing_mode,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Configuration OK");
            println!("  Notifiers:          {}", report.notifiers.join(", "));
            println!("  Ignored exceptions: {}", report.ignored_exceptions.join(", "));
            if report.grouping_enabled {
                println!(
                    "  Grouping:           enabled ({}, {:?} store)",
                    humantime::format_duration(report.grouping_period),
                    report.store
                );
            } else {
                println!("  Grouping:           disabled");
            }
            println!("  Testing mode:       {}", report.testing_mode);
        }
    }

    Ok(())
}

/// One replayed line: an exception record with optional per-call options
#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(flatten)]
    exception: ExceptionRecord,
    #[serde(default)]
    options: NotifyOptions,
}

#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    total: u64,
    notified: u64,
    skipped: u64,
    failed: u64,
}

async fn run_replay(
    config: &Config,
    file: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let notifier = ExceptionNotifier::from_config(config)
        .await
        .context("failed to build exception notifier")?;

    let summary = match file {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay(&notifier, BufReader::new(file)).await?
        }
        None => replay(&notifier, BufReader::new(tokio::io::stdin())).await?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Replayed {} exception(s)", summary.total);
            println!("  Notified:           {}", summary.notified);
            println!("  Ignored/suppressed: {}", summary.skipped);
            println!("  Failed:             {}", summary.failed);
        }
    }

    Ok(())
}

async fn replay<R>(notifier: &ExceptionNotifier, reader: R) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        summary.total += 1;

        let entry: ReplayLine = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(line = line_number, error = %e, "Skipping malformed record");
                summary.failed += 1;
                continue;
            }
        };

        match notifier.notify(&entry.exception, entry.options).await {
            Ok(true) => summary.notified += 1,
            Ok(false) => summary.skipped += 1,
            Err(e) => {
                warn!(line = line_number, error = %e, "Notification failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn run_policy(up_to: u64, format: OutputFormat) {
    let counts: Vec<u64> = (1..=up_to).filter(|&count| send_notification(count)).collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "up_to": up_to, "notify_on": counts })),
        OutputFormat::Text => {
            let rendered: Vec<String> = counts.iter().map(ToString::to_string).collect();
            println!(
                "{} notification(s) in {} occurrence(s): {}",
                counts.len(),
                up_to,
                rendered.join(", ")
            );
        }
    }
}
