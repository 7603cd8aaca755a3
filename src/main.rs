//! Wheelhouse roulette server binary
//!
//! Loads configuration, restores the ledger, starts the background workers
//! and serves the HTTP API until Ctrl+C or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wheelhouse::api::{shutdown_signal, ApiServer};
use wheelhouse::config::{ConfigLoader, StorageBackend, WheelhouseConfig};
use wheelhouse::service::ServiceBuilder;

#[derive(Parser, Debug)]
#[command(name = "wheelhouse")]
#[command(about = "European roulette tables with a player/house credit ledger", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from the development preset (in-memory store, localhost)
    #[arg(long, conflicts_with = "production")]
    dev: bool,

    /// Start from the production preset
    #[arg(long)]
    production: bool,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Storage backend: rocksdb or memory
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// Database directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Backup directory
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut WheelhouseConfig) {
        if let Some(host) = &self.host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(backend) = self.storage {
            config.storage.backend = backend;
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_directory = dir.clone();
        }
        if let Some(dir) = &self.backup_dir {
            config.storage.backup_directory = dir.clone();
        }
        if let Some(origins) = &self.cors_origins {
            config.api.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let base = if args.dev {
        WheelhouseConfig::development()
    } else if args.production {
        WheelhouseConfig::production()
    } else {
        WheelhouseConfig::default()
    };
    let mut loader = ConfigLoader::new().with_base(base);
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    args.apply(&mut config);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.monitoring.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &args.write_config {
        loader.save(&config, path)?;
        info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.storage.backend,
        data_dir = %config.storage.data_directory.display(),
        "starting wheelhouse"
    );

    let service = ServiceBuilder::new(config.clone()).build().await?;
    service.start().await?;

    let server = ApiServer::new(config.api.clone(), Arc::clone(&service));
    let served = server.run(shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "API server failed");
    }

    service.stop().await?;
    served
}
