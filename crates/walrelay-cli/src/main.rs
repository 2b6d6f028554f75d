use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use walrelay_config::RelayConfig;
use walrelay_core::{CancellationToken, SkipCounter};
use walrelay_publish::StdoutPublisher;

mod config;
mod env;
mod replay;

use config::load_config;
use replay::{run_replay, ReplayFile};

#[derive(Parser)]
#[command(name = "walrelay")]
#[command(about = "Filter Postgres logical replication changes and relay them as events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the relay config file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config file and print a summary
    Check,

    /// Replay recorded transactions through the filter to stdout
    Replay {
        /// JSON file with relations and transactions
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = env::load_dotenv_from_ancestors()?;

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_tracing(&config.logger.level)?;
    if let Some(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }

    match cli.command {
        Commands::Check => cmd_check(&cli.config, &config),
        Commands::Replay { input } => cmd_replay(config, &input).await,
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let directive = format!("walrelay={}", level.to_ascii_lowercase())
        .parse::<Directive>()
        .with_context(|| format!("Invalid log level: {}", level))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    Ok(())
}

fn cmd_check(path: &Path, config: &RelayConfig) -> Result<()> {
    println!("{} is valid", path.display());
    println!("  topic: {}", config.publisher.topic);
    if !config.publisher.topic_prefix.is_empty() {
        println!("  topic prefix: {}", config.publisher.topic_prefix);
    }

    let filter = &config.listener.filter;
    let mut tables: Vec<_> = filter.tables.iter().collect();
    tables.sort();
    if tables.is_empty() {
        println!("  no tables allowed, every event will be dropped");
    }
    for (table, actions) in tables {
        println!("  {}: {}", table, actions.join(", "));
        if let Some(columns) = filter.column_filter.get(table) {
            let mut columns: Vec<_> = columns.iter().collect();
            columns.sort();
            for (column, values) in columns {
                println!("    {} in [{}]", column, values.join(", "));
            }
        }
    }

    let mut mapped: Vec<_> = config.listener.topics_map.iter().collect();
    mapped.sort();
    for (table, topic) in mapped {
        println!("  {} -> {}", table, topic);
    }

    Ok(())
}

async fn cmd_replay(config: RelayConfig, input: &Path) -> Result<()> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read replay file: {}", input.display()))?;
    let replay = ReplayFile::parse(&content)?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, stopping");
            token.cancel();
        }
    });

    let monitor = Arc::new(SkipCounter::new());
    let publisher = StdoutPublisher::new();
    let summary = run_replay(&config, replay, &publisher, monitor.clone(), cancel).await?;

    eprintln!(
        "Replayed {} transaction(s), published {} event(s){}",
        summary.transactions,
        summary.published,
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    let skipped = monitor.snapshot();
    if !skipped.is_empty() {
        eprintln!("Skipped by filter:");
        for (table, count) in skipped {
            eprintln!("  {}: {}", table, count);
        }
    }

    Ok(())
}
