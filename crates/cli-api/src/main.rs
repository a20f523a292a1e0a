//! CLI entry point for the video-compilation API: loads configuration,
//! wires the shared job store / warehouse / broker / path tables, and
//! serves the HTTP surface (§6).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use vidcompile_api::{create_router, AppState};
use vidcompile_api::verification::VerificationService;
use vidcompile_broker::{Dispatcher, RedisBroker};
use vidcompile_config::Config;
use vidcompile_media::path::{PathTables, ShareEntry};
use vidcompile_media::probe::ProbePool;
use vidcompile_store::{JobStore, WarehouseGateway};

/// Video-compilation API server
#[derive(Parser, Debug)]
#[command(name = "vidcompile-api")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn init_logging(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn share_entries(config: &Config) -> Vec<ShareEntry> {
    config
        .paths
        .shares
        .iter()
        .map(|s| ShareEntry {
            share: s.share.clone(),
            drive_letter: s.drive_letter.clone(),
            container_mount: s.container_mount.clone(),
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log.format);
    tracing::info!(config = %args.config.display(), "vidcompile-api starting");

    let store_pool = match PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .connect(&config.store.url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to relational store");
            return ExitCode::FAILURE;
        }
    };

    let warehouse_pool = match PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .connect(&config.warehouse.url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to warehouse");
            return ExitCode::FAILURE;
        }
    };

    let broker = match RedisBroker::connect(&config.broker.url).await {
        Ok(b) => Arc::new(b),
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to broker");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(JobStore::new(store_pool));
    let warehouse = Arc::new(WarehouseGateway::new(
        warehouse_pool,
        Duration::from_secs(config.warehouse.channel_cache_ttl_secs),
    ));
    let path_tables = Arc::new(PathTables::new(
        share_entries(&config),
        config.paths.containerized,
        config.paths.network_host.clone(),
    ));
    let probe_pool = Arc::new(ProbePool::new(
        config.transcoder.probe_binary.clone(),
        config.transcoder.probe_parallelism,
    ));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), broker.clone()));
    let verification = Arc::new(VerificationService::new(
        warehouse.clone(),
        path_tables.clone(),
        probe_pool.clone(),
    ));

    let state = AppState {
        store,
        warehouse,
        broker,
        dispatcher,
        path_tables,
        probe_pool,
        verification,
        config: Arc::new(config.clone()),
    };

    let router = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr, error = %e, "failed to bind server address");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(addr, "listening");
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
