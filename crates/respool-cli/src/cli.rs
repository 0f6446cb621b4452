//! respool - inspect pool configurations and probe endpoints
//!
//! Usage:
//!   # Validate a configuration file and print the effective settings
//!   respool check --config pool.toml
//!
//!   # Run a pool against a TCP endpoint, holding 3 connections at once
//!   respool probe --config pool.toml --address 127.0.0.1:6379 --hold 3

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use respool::{Pool, PoolConfig, PoolMetricsSnapshot, PoolStats};
use respool_drivers::TcpFactory;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "respool")]
#[command(version)]
#[command(about = "Inspect connection pool configurations and probe endpoints", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a pool configuration
    Check {
        /// Path to the TOML configuration
        #[arg(short, long, env = "RESPOOL_CONFIG")]
        config: PathBuf,
    },

    /// Build a pool against a TCP endpoint and report its statistics
    Probe {
        /// Path to the TOML configuration (defaults apply when omitted)
        #[arg(short, long, env = "RESPOOL_CONFIG")]
        config: Option<PathBuf>,

        /// Endpoint to connect to, as host:port
        #[arg(short, long, env = "RESPOOL_ADDRESS")]
        address: String,

        /// Number of connections to check out at the same time
        #[arg(long, default_value_t = 1)]
        hold: usize,

        /// Print statistics as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Probe {
            config,
            address,
            hold,
            json,
        } => probe(config.as_deref(), address, hold, json).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<PoolConfig> {
    let config = PoolConfig::load(path)
        .with_context(|| format!("failed to load pool configuration from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid pool configuration in {}", path.display()))?;
    Ok(config)
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    println!("{}", settings_table(&config));
    println!("configuration OK");
    Ok(())
}

async fn probe(
    path: Option<&Path>,
    address: String,
    hold: usize,
    json: bool,
) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => PoolConfig::default(),
    };
    if hold > config.max_connections() {
        bail!(
            "cannot hold {hold} connections with max_connections = {}",
            config.max_connections()
        );
    }

    let pool = Pool::new(config, TcpFactory::new(address.clone()))
        .await
        .with_context(|| format!("failed to build pool for {address}"))?;
    tracing::info!(pool_id = %pool.id(), address = %address, hold, "probing endpoint");

    let held = futures::future::try_join_all((0..hold).map(|_| pool.get()))
        .await
        .with_context(|| format!("failed to check out {hold} connection(s)"));
    let held = match held {
        Ok(held) => held,
        Err(e) => {
            pool.close().await.ok();
            return Err(e);
        }
    };

    let stats = pool.stats();
    for conn in held {
        conn.close().await.context("failed to return connection")?;
    }
    pool.close().await.context("failed to close pool")?;
    let metrics = pool.metrics();

    if json {
        let report = serde_json::json!({
            "address": address,
            "stats": stats,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", stats_table(&stats));
        println!("{}", metrics_table(&metrics));
    }
    Ok(())
}

fn new_table(header: [&str; 2]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn settings_table(config: &PoolConfig) -> Table {
    let optional = |value: Option<String>| value.unwrap_or_else(|| "unbounded".to_string());

    let mut table = new_table(["setting", "value"]);
    table
        .add_row(["max_connections".to_string(), config.max_connections().to_string()])
        .add_row(["init_connections".to_string(), config.init_connections().to_string()])
        .add_row([
            "max_idle_connections".to_string(),
            config.max_idle_connections().to_string(),
        ])
        .add_row(["max_idle_time".to_string(), format!("{:?}", config.max_idle_time())])
        .add_row([
            "max_wait_time".to_string(),
            optional(config.max_wait_time().map(|d| format!("{d:?}"))),
        ])
        .add_row([
            "max_retry_count".to_string(),
            optional(config.max_retry_count().map(|n| n.to_string())),
        ])
        .add_row([
            "keep_alive_interval".to_string(),
            format!("{:?}", config.keep_alive_interval()),
        ])
        .add_row([
            "maintenance_interval".to_string(),
            format!("{:?}", config.maintenance_interval()),
        ]);
    table
}

fn stats_table(stats: &PoolStats) -> Table {
    let mut table = new_table(["stat", "value"]);
    table
        .add_row(["max".to_string(), stats.max().to_string()])
        .add_row(["total".to_string(), stats.total().to_string()])
        .add_row(["idle".to_string(), stats.idle().to_string()])
        .add_row(["active".to_string(), stats.active().to_string()])
        .add_row(["in_flight".to_string(), stats.in_flight().to_string()])
        .add_row(["waiting".to_string(), stats.waiting().to_string()])
        .add_row([
            "utilization".to_string(),
            format!("{:.0}%", stats.utilization() * 100.0),
        ]);
    table
}

fn metrics_table(metrics: &PoolMetricsSnapshot) -> Table {
    let mut table = new_table(["metric", "count"]);
    let rows = [
        ("connections_created", metrics.connections_created),
        ("connections_disconnected", metrics.connections_disconnected),
        ("acquisitions", metrics.acquisitions),
        ("exhausted", metrics.exhausted),
        ("validation_failures", metrics.validation_failures),
        ("keep_alive_failures", metrics.keep_alive_failures),
        ("maintenance_runs", metrics.maintenance_runs),
        ("maintenance_errors", metrics.maintenance_errors),
    ];
    for (name, value) in rows {
        table.add_row([name.to_string(), value.to_string()]);
    }
    table
}
