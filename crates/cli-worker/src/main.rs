//! CLI entry point for the video-compilation worker: reserves one job at a
//! time off the broker's three queues and drives it through the Worker
//! Pipeline (C12), alongside the Keep-Alive (C8) and Stale-Job Detector
//! (C7) background tasks (§5 — the worker runtime is concurrent-tasks,
//! one active compilation at a time).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

use vidcompile_broker::{RedisBroker, StaleJobDetector};
use vidcompile_config::Config;
use vidcompile_core::model::Queue;
use vidcompile_media::copy::HostKind;
use vidcompile_media::path::ShareEntry;
use vidcompile_store::{JobStore, WarehouseGateway};
use vidcompile_worker::{KeepAlive, PipelineConfig, Prefetcher, WorkerPipeline};

const QUEUE_PRIORITY: [Queue; 3] = [Queue::FourKQueue, Queue::GpuQueue, Queue::DefaultQueue];
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Video-compilation worker
#[derive(Parser, Debug)]
#[command(name = "vidcompile-worker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Name this worker registers reservations under; defaults to the hostname.
    #[arg(long)]
    worker_name: Option<String>,
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

fn mount_roots(config: &Config) -> Vec<String> {
    config
        .paths
        .shares
        .iter()
        .filter_map(|s| s.container_mount.clone())
        .collect()
}

fn worker_name(args: &Args) -> String {
    args.worker_name.clone().unwrap_or_else(|| {
        hostname_fallback()
    })
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| format!("worker-{}", std::process::id()))
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
    let name = worker_name(&args);
    tracing::info!(worker_name = %name, config = %args.config.display(), "vidcompile-worker starting");

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
    let path_tables = vidcompile_media::path::PathTables::new(
        share_entries(&config),
        config.paths.containerized,
        config.paths.network_host.clone(),
    );
    let host_kind = if config.paths.containerized {
        HostKind::Container
    } else {
        HostKind::DirectAccess
    };

    let pipeline = Arc::new(WorkerPipeline::new(
        store.clone(),
        broker.clone(),
        warehouse.clone(),
        Arc::new(Prefetcher::new()),
        PipelineConfig {
            worker_name: name.clone(),
            output_root: config.paths.output_root.clone(),
            temp_root: config.paths.temp_dir.clone(),
            transcoder_binary: config.transcoder.binary.clone(),
            probe_binary: config.transcoder.probe_binary.clone(),
            probe_parallelism: config.transcoder.probe_parallelism,
            copy_parallelism: config.transcoder.copy_parallelism,
            host_kind,
            path_tables,
            prefer_gpu_encoder: config.transcoder.prefer_gpu_encoder,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let keep_alive = KeepAlive::new(mount_roots(&config), Duration::from_secs(config.paths.keep_alive_interval_secs));
    let keep_alive_handle = tokio::spawn(keep_alive.run(shutdown_rx.clone()));

    let stale_detector = Arc::new(StaleJobDetector::new(
        store.clone(),
        broker.clone(),
        Duration::from_secs(config.broker.stale_job_poll_secs),
        Duration::from_secs(config.broker.stale_job_age_secs as u64),
    ));
    let stale_detector_handle = tokio::spawn(stale_detector.run(shutdown_rx.clone()));

    tokio::select! {
        _ = run_worker_loop(pipeline, broker, name, shutdown_rx.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = keep_alive_handle.await;
    let _ = stale_detector_handle.await;

    ExitCode::SUCCESS
}

/// Drains the three queues in priority order, running one job at a time
/// (concurrency = 1 per worker instance, §5). Before running each job, the
/// loop also reserves the next one (if any is queued) ahead of time, so the
/// broker's reservation list for this worker holds both the job in flight
/// and the one queued up behind it — the prefetch step (C12 step 0) reads
/// that same list to find work to warm up in the background, mirroring a
/// celery worker's task-prefetch behavior.
async fn run_worker_loop(
    pipeline: Arc<WorkerPipeline<RedisBroker>>,
    broker: Arc<RedisBroker>,
    worker_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending: Option<(Queue, String, uuid::Uuid)> = None;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let (queue, task_id, job_id) = match pending.take() {
            Some(reserved) => reserved,
            None => {
                let Some(reserved) = reserve_any_queue(&broker, &worker_name).await else {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                };
                reserved
            }
        };

        tracing::info!(job_id = %job_id, queue = %queue, task_id, "reserved job");

        pending = reserve_any_queue(&broker, &worker_name).await;

        let success = pipeline.run(job_id, queue).await.is_ok();
        if let Err(e) = broker.complete(&task_id, &worker_name, success).await {
            tracing::warn!(task_id, error = %e, "failed to mark task complete on broker");
        }
    }
}

async fn reserve_any_queue(broker: &RedisBroker, worker_name: &str) -> Option<(Queue, String, uuid::Uuid)> {
    for queue in QUEUE_PRIORITY {
        match broker.reserve_next(queue, worker_name).await {
            Ok(Some((task_id, job_id))) => return Some((queue, task_id, job_id)),
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(queue = %queue, error = %e, "failed to reserve from queue");
                continue;
            }
        }
    }
    None
}
