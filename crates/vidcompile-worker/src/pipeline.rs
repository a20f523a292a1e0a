//! Worker Pipeline (C12): the end-to-end sequence that executes one job
//! from its row to a published output file (§4.11).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use vidcompile_broker::Broker;
use vidcompile_core::item::ProcessedItem;
use vidcompile_core::model::{ItemType, Queue};
use vidcompile_core::subtitle::{generate_ass, SubtitleTiming};
use vidcompile_media::copy::{CopyEngine, CopyRequest, HostKind};
use vidcompile_media::gpu::is_gpu_available;
use vidcompile_media::path::{normalize_many, PathTables};
use vidcompile_media::probe::ProbePool;
use vidcompile_media::progress::ProgressParser;
use vidcompile_media::transcoder::{build_transcoder_command, TranscoderOptions};
use vidcompile_store::{JobPatch, JobStore, WarehouseGateway};

use crate::cancellation::CancellationWatcher;
use crate::error::WorkerError;
use crate::prefetch::Prefetcher;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct PipelineConfig {
    pub worker_name: String,
    pub output_root: String,
    pub temp_root: String,
    pub transcoder_binary: String,
    pub probe_binary: String,
    pub probe_parallelism: usize,
    pub copy_parallelism: usize,
    pub host_kind: HostKind,
    pub path_tables: PathTables,
    pub prefer_gpu_encoder: bool,
}

pub struct WorkerPipeline<B: Broker> {
    store: Arc<JobStore>,
    broker: Arc<B>,
    warehouse: Arc<WarehouseGateway>,
    prefetcher: Arc<Prefetcher>,
    config: PipelineConfig,
}

impl<B: Broker + 'static> WorkerPipeline<B> {
    pub fn new(
        store: Arc<JobStore>,
        broker: Arc<B>,
        warehouse: Arc<WarehouseGateway>,
        prefetcher: Arc<Prefetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self { store, broker, warehouse, prefetcher, config }
    }

    /// Runs one job end-to-end. Errors are already reflected onto the job
    /// row (failed, unless the job was already cancelled) before this
    /// returns — callers only need the error for logging.
    pub async fn run(&self, job_id: Uuid, queue: Queue) -> Result<(), WorkerError> {
        let temp_dir = Path::new(&self.config.temp_root).join(job_id.to_string());
        let result = self.run_inner(job_id, queue, &temp_dir).await;

        if let Err(ref e) = result {
            tracing::warn!(job_id = %job_id, error = %e, "job pipeline failed");
            let _ = self.store.apply_patch(job_id, JobPatch::Fail { error_message: e.to_string() }).await;
        }

        if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(job_id = %job_id, error = %e, "temp tree cleanup failed");
            }
        }

        result
    }

    async fn run_inner(&self, job_id: Uuid, queue: Queue, temp_dir: &Path) -> Result<(), WorkerError> {
        // 1. load
        let job = self.store.get_job(job_id).await?;

        // 2. transition to processing
        self.store
            .apply_patch(
                job_id,
                JobPatch::StartProcessing { worker_id: self.config.worker_name.clone(), queue_name: queue.to_string() },
            )
            .await?;

        let watcher = CancellationWatcher::spawn(self.store.clone(), job_id, CANCEL_POLL_INTERVAL);

        // 3. load items
        let items = self.store.get_items(job_id).await?;
        if items.is_empty() {
            return Err(WorkerError::EmptyJob(job_id));
        }

        // 4. prefetch probe (step 0)
        self.spawn_prefetch_if_reserved(job_id).await;

        // 5. batch resolve catalog-id items
        let video_ids: Vec<Uuid> = items.iter().filter_map(|i| i.video_id).collect();
        let resolved = self.warehouse.resolve_videos(&video_ids).await?;

        let mut source_paths: Vec<String> = Vec::with_capacity(items.len());
        let mut dest_filenames: Vec<String> = Vec::with_capacity(items.len());
        let mut logo_paths: Vec<Option<String>> = Vec::with_capacity(items.len());

        for item in &items {
            let source = match item.video_id.and_then(|id| resolved.get(&id)) {
                Some(video) => video.path.clone(),
                None => item.path.clone(),
            };
            source_paths.push(source);
            dest_filenames.push(item.destination_filename());
            logo_paths.push(item.logo_path.clone());
        }

        // 6. plan copy set (normalize sources, build flat request list)
        let normalized_sources = normalize_many(&source_paths, &self.config.path_tables);
        let mut requests = Vec::with_capacity(items.len() * 2);
        for (i, item) in items.iter().enumerate() {
            requests.push(CopyRequest { source_path: normalized_sources[i].clone(), dest_filename: dest_filenames[i].clone() });
            if item.item_type == ItemType::Video {
                if let Some(logo) = &logo_paths[i] {
                    let normalized_logo = normalize_many(std::slice::from_ref(logo), &self.config.path_tables)
                        .into_iter()
                        .next()
                        .unwrap_or_default();
                    requests.push(CopyRequest { source_path: normalized_logo, dest_filename: item.logo_filename().unwrap_or_default() });
                }
            }
        }

        let temp_dir_str = temp_dir.to_string_lossy().to_string();
        tokio::fs::create_dir_all(&temp_dir_str).await?;

        // 7. parallel copy
        let copy_engine = CopyEngine::new(self.config.host_kind, self.config.copy_parallelism);
        let copy_results = copy_engine.copy_many(&requests, &temp_dir_str, watcher.copy_hooks()).await;
        for req in &requests {
            match copy_results.get(&req.dest_filename) {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(WorkerError::Copy(clone_copy_error(e))),
                None => return Err(WorkerError::Copy(vidcompile_media::CopyError::SourceNotFound(req.source_path.clone()))),
            }
        }
        if watcher.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        // 8. probe durations for every non-image item
        let probe_pool = ProbePool::new(self.config.probe_binary.clone(), self.config.probe_parallelism);
        let probe_targets: Vec<String> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.item_type != ItemType::Image)
            .map(|(i, _)| temp_dir.join(&dest_filenames[i]).to_string_lossy().to_string())
            .collect();
        let probes = probe_pool.probe_many(&probe_targets).await;

        // 9/10. synthesize subtitles and build the processed-item list
        let mut processed = Vec::with_capacity(items.len());
        let mut total_duration_s = 0.0f64;

        for (i, item) in items.iter().enumerate() {
            let local_path = temp_dir.join(&dest_filenames[i]).to_string_lossy().to_string();
            let duration_s = if item.item_type == ItemType::Image {
                item.duration
            } else {
                let probe_path = temp_dir.join(&dest_filenames[i]).to_string_lossy().to_string();
                probes.get(&probe_path).and_then(|p| *p).map(|info| info.duration_s).unwrap_or(item.duration)
            };
            total_duration_s += duration_s;

            let mut processed_item = ProcessedItem::new(item.item_type, item.position, local_path, duration_s);

            if item.item_type == ItemType::Video {
                if logo_paths[i].is_some() {
                    if let Some(logo_name) = item.logo_filename() {
                        processed_item.logo_local_path = Some(temp_dir.join(&logo_name).to_string_lossy().to_string());
                    }
                }

                if let Some(text) = item.text_animation_text.as_deref().filter(|t| !t.is_empty()) {
                    let ass = generate_ass(text, duration_s, SubtitleTiming::default());
                    let subtitle_name = format!("text_{}.ass", item.position);
                    let subtitle_path = temp_dir.join(&subtitle_name);
                    tokio::fs::write(&subtitle_path, ass).await?;
                    processed_item.subtitle_path = Some(subtitle_path.to_string_lossy().to_string());
                }
            }

            processed.push(processed_item);
        }

        // 11. build transcoder argument vector
        let gpu_available = self.config.prefer_gpu_encoder && is_gpu_available(&self.config.transcoder_binary);
        let output_filename = output_filename(&job.channel_name, job_id);
        let local_output_path = temp_dir.join(&output_filename).to_string_lossy().to_string();
        let opts = TranscoderOptions { enable_4k: job.enable_4k, gpu_available };
        let args = build_transcoder_command(&processed, &local_output_path, opts);

        // 12. run via the progress parser
        let parser = ProgressParser::new(temp_dir.join("logs").to_string_lossy().to_string());
        let store = self.store.clone();
        let prefetch_hook = Arc::new(PrefetchTrigger {
            broker: self.broker.clone(),
            worker_name: self.config.worker_name.clone(),
            current_job_id: job_id,
            prefetcher: self.prefetcher.clone(),
            store: self.store.clone(),
            warehouse: self.warehouse.clone(),
            temp_root: self.config.temp_root.clone(),
            path_tables: self.config.path_tables.clone(),
            host_kind: self.config.host_kind,
            copy_parallelism: self.config.copy_parallelism,
        });
        let outcome = parser
            .run(
                &self.config.transcoder_binary,
                &args,
                total_duration_s,
                watcher.checker(),
                prefetch_hook,
                |percent| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let _ = store
                            .apply_patch(job_id, JobPatch::SetProgress { progress: percent as u8, message: format!("{percent}%") })
                            .await;
                    });
                },
            )
            .await?;

        if outcome.cancelled || watcher.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        if outcome.exit_code != 0 {
            return Err(WorkerError::TranscoderFailed(outcome.exit_code));
        }

        // publish output
        let profile = self.store.get_profile(job.user_id).await?;
        let output_dir = format!("{}/{}/{}", self.config.output_root, job.channel_name, profile.username);
        let published = CopyEngine::new(self.config.host_kind, 1)
            .copy_one(&local_output_path, &output_dir, &output_filename)
            .await
            .map_err(WorkerError::Copy)?;

        self.store
            .apply_patch(
                job_id,
                JobPatch::Complete { output_path: published.to_string_lossy().to_string(), final_duration: total_duration_s },
            )
            .await?;

        // 13. report analytics (best effort)
        let video_count = items.iter().filter(|i| i.item_type == ItemType::Video).count() as i32;
        if let Err(e) = self
            .store
            .record_compilation_history(job_id, job.user_id, &job.channel_name, video_count, total_duration_s, &output_filename)
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "failed to record compilation history");
        }

        Ok(())
    }

    /// Step 0: checks whether this worker already has a second task
    /// reserved beyond `current_job_id` (the worker loop pre-reserves the
    /// next queue entry before running the current job, so both sit in the
    /// broker's reservation list at once), and if so fires a best-effort
    /// background copy of that job's items into its own temp tree.
    async fn spawn_prefetch_if_reserved(&self, current_job_id: Uuid) {
        check_and_launch_prefetch(
            self.broker.as_ref(),
            &self.config.worker_name,
            current_job_id,
            self.prefetcher.as_ref(),
            self.store.clone(),
            self.warehouse.clone(),
            self.config.temp_root.clone(),
            self.config.path_tables.clone(),
            self.config.host_kind,
            self.config.copy_parallelism,
        )
        .await;
    }
}

/// Finds a reserved task other than `current_job_id`, claims it through
/// `prefetcher` (idempotent — a job already prefetched this process
/// lifetime is a no-op), and spawns its background copy. Shared by the
/// step-0 check and the mid-encode [`PrefetchHook`] tick so both paths
/// agree on what "already prefetched" means.
async fn check_and_launch_prefetch<B: Broker>(
    broker: &B,
    worker_name: &str,
    current_job_id: Uuid,
    prefetcher: &Prefetcher,
    store: Arc<JobStore>,
    warehouse: Arc<WarehouseGateway>,
    temp_root: String,
    path_tables: PathTables,
    host_kind: HostKind,
    copy_parallelism: usize,
) {
    let reserved = match broker.reserved_tasks(worker_name).await {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::debug!(error = %e, "prefetch probe: could not list reserved tasks");
            return;
        }
    };

    let mut next_job_id = None;
    for task_id in &reserved {
        match broker.job_id_for_task(task_id).await {
            Ok(Some(id)) if id != current_job_id => {
                next_job_id = Some(id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "prefetch probe: could not resolve reserved task's job id");
                continue;
            }
        }
    }

    let Some(job_id) = next_job_id else { return };
    if !prefetcher.try_claim(job_id) {
        return;
    }

    tokio::spawn(async move {
        if let Err(e) = prefetch_job(store, warehouse, temp_root, path_tables, host_kind, copy_parallelism, job_id).await {
            tracing::debug!(job_id = %job_id, error = %e, "background prefetch copy failed");
        }
    });
}

/// Invokes [`check_and_launch_prefetch`] every time the transcode crosses a
/// 20-percent boundary (§4.11's mid-encode prefetch tick), in case the next
/// task wasn't reserved yet when the job started.
struct PrefetchTrigger<B: Broker> {
    broker: Arc<B>,
    worker_name: String,
    current_job_id: Uuid,
    prefetcher: Arc<Prefetcher>,
    store: Arc<JobStore>,
    warehouse: Arc<WarehouseGateway>,
    temp_root: String,
    path_tables: PathTables,
    host_kind: HostKind,
    copy_parallelism: usize,
}

impl<B: Broker + 'static> vidcompile_media::progress::PrefetchHook for PrefetchTrigger<B> {
    fn on_prefetch_point(&self) {
        let broker = self.broker.clone();
        let worker_name = self.worker_name.clone();
        let current_job_id = self.current_job_id;
        let prefetcher = self.prefetcher.clone();
        let store = self.store.clone();
        let warehouse = self.warehouse.clone();
        let temp_root = self.temp_root.clone();
        let path_tables = self.path_tables.clone();
        let host_kind = self.host_kind;
        let copy_parallelism = self.copy_parallelism;

        tokio::spawn(async move {
            check_and_launch_prefetch(
                broker.as_ref(),
                &worker_name,
                current_job_id,
                prefetcher.as_ref(),
                store,
                warehouse,
                temp_root,
                path_tables,
                host_kind,
                copy_parallelism,
            )
            .await;
        });
    }
}

async fn prefetch_job(
    store: Arc<JobStore>,
    warehouse: Arc<WarehouseGateway>,
    temp_root: String,
    path_tables: PathTables,
    host_kind: HostKind,
    copy_parallelism: usize,
    job_id: Uuid,
) -> Result<(), WorkerError> {
    let items = store.get_items(job_id).await?;
    let video_ids: Vec<Uuid> = items.iter().filter_map(|i| i.video_id).collect();
    let resolved = warehouse.resolve_videos(&video_ids).await?;

    let sources: Vec<String> = items
        .iter()
        .map(|item| item.video_id.and_then(|id| resolved.get(&id)).map(|v| v.path.clone()).unwrap_or_else(|| item.path.clone()))
        .collect();
    let normalized = normalize_many(&sources, &path_tables);

    let requests: Vec<CopyRequest> = items
        .iter()
        .enumerate()
        .map(|(i, item)| CopyRequest { source_path: normalized[i].clone(), dest_filename: item.destination_filename() })
        .collect();

    let temp_dir = PathBuf::from(&temp_root).join(job_id.to_string());
    tokio::fs::create_dir_all(&temp_dir).await?;
    let engine = CopyEngine::new(host_kind, copy_parallelism);
    engine.copy_many(&requests, &temp_dir.to_string_lossy(), Arc::new(vidcompile_media::copy::NoHooks)).await;
    Ok(())
}

fn output_filename(channel: &str, job_id: Uuid) -> String {
    format!("{channel}_{job_id}.mp4")
}

fn clone_copy_error(e: &vidcompile_media::CopyError) -> vidcompile_media::CopyError {
    use vidcompile_media::CopyError;
    match e {
        CopyError::SourceNotFound(s) => CopyError::SourceNotFound(s.clone()),
        CopyError::AllMethodsFailed { src, last_error } => CopyError::AllMethodsFailed { src: src.clone(), last_error: last_error.clone() },
        CopyError::Cancelled => CopyError::Cancelled,
        CopyError::Io(e) => CopyError::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_filename_matches_channel_and_job_id_convention() {
        let job_id = Uuid::new_v4();
        let name = output_filename("demo_channel", job_id);
        assert_eq!(name, format!("demo_channel_{job_id}.mp4"));
    }
}
