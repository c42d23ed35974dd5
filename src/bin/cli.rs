use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use catalog_ingest as lib;
use lib::auth_cache::AuthCache;
use lib::config::{Config, ProviderConfig};
use lib::http::ReqwestTransport;
use lib::models::ReleaseInfo;
use lib::pagination::CancelPolicy;
use lib::worker::{aggregate, Ingestor};

#[derive(Parser)]
#[command(name = "catalog-ingest", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and normalize results from the configured providers
    Fetch {
        /// Only fetch this provider (by configured name)
        #[arg(long)]
        provider: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// List configured providers
    Providers,
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One JSON record per line
    Json,
    /// Human readable table
    Table,
}

fn resolve_config_path(explicit: Option<&PathBuf>) -> PathBuf {
    // Explicit --config wins; otherwise prefer the system-wide config and fall
    // back to the repository example for local/dev usage.
    match explicit {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/catalog-ingest/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    }
}

/// Logs go to stderr and a daily-rotated file in `log_dir`; stdout carries records.
fn init_logging(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "catalog-ingest.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber_global::set_global_default(subscriber)
        .map_err(|e| anyhow!("failed to set global tracing subscriber: {}", e))?;
    Ok(guard)
}

fn print_table(records: &[ReleaseInfo]) {
    for r in records {
        let date = r
            .publish_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let seeders = r.seeders.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        let free = if r.flags.contains(lib::models::IndexerFlags::FREELEECH) { "FL" } else { "" };
        println!("{:<16} {:<10} {:>6} {:<2} {}", date, r.indexer, seeders, free, r.title);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_ref());

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {:#}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = Config::from_path(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let _guard = init_logging(&cfg)?;

    match cli.command {
        Commands::ConfigValidate => {}
        Commands::Providers => {
            for p in &cfg.providers {
                println!(
                    "{} ({}) {}{}",
                    p.name,
                    p.kind.as_str(),
                    p.base_url,
                    if p.enabled { "" } else { " [disabled]" }
                );
            }
        }
        Commands::Fetch { provider, format } => {
            let selected: Vec<Arc<ProviderConfig>> = match &provider {
                Some(name) => {
                    let p = cfg
                        .provider(name)
                        .ok_or_else(|| anyhow!("no provider named '{}' in config", name))?;
                    // an explicitly requested provider runs even when disabled
                    let mut p = p.clone();
                    p.enabled = true;
                    vec![Arc::new(p)]
                }
                None => cfg.providers.iter().cloned().map(Arc::new).collect(),
            };

            let transport = ReqwestTransport::new(Duration::from_secs(cfg.request_timeout_secs))
                .map_err(|e| anyhow!("building HTTP client: {}", e))?;
            let cancel = CancellationToken::new();
            let ingestor = Ingestor::new(Arc::new(transport), Arc::new(AuthCache::new()))
                .with_cancellation(cancel.clone(), CancelPolicy::KeepPartial);

            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted; returning results fetched so far");
                    ctrl_c.cancel();
                }
            });

            let results = ingestor.fetch_all(&selected).await;
            let failed: Vec<String> = results
                .iter()
                .filter_map(|(name, r)| r.as_ref().err().map(|e| format!("{}: {}", name, e)))
                .collect();

            let records = aggregate(results);
            match format {
                OutputFormat::Json => {
                    for r in &records {
                        println!("{}", serde_json::to_string(r)?);
                    }
                }
                OutputFormat::Table => print_table(&records),
            }

            if !failed.is_empty() {
                for f in &failed {
                    eprintln!("Fetch failed: {}", f);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
