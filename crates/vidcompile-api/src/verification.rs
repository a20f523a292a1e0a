//! Verification Service (C13): resolves a proposed job's items against the
//! catalog and filesystem before a job is ever persisted (§4.12).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vidcompile_core::model::{ItemType, JobItem};
use vidcompile_media::path::{normalize_many, PathTables};
use vidcompile_media::probe::ProbePool;
use vidcompile_store::WarehouseGateway;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationRequest {
    pub channel_name: String,
    #[serde(default)]
    pub video_ids: Vec<Uuid>,
    #[serde(default)]
    pub manual_paths: Vec<String>,
    #[serde(default)]
    pub include_intro: bool,
    #[serde(default)]
    pub include_outro: bool,
    #[serde(default)]
    pub enable_logos: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub default_logo_path: Option<String>,
    pub total_duration: f64,
    pub items: Vec<JobItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathCheckResult {
    pub path_available: bool,
    pub duration: f64,
    pub resolution: String,
    pub is_4k: bool,
}

pub struct VerificationService {
    warehouse: Arc<WarehouseGateway>,
    path_tables: Arc<PathTables>,
    probe_pool: Arc<ProbePool>,
}

impl VerificationService {
    pub fn new(warehouse: Arc<WarehouseGateway>, path_tables: Arc<PathTables>, probe_pool: Arc<ProbePool>) -> Self {
        Self { warehouse, path_tables, probe_pool }
    }

    /// Full verification: channel assets + catalog resolution + ordered
    /// item assembly + probing.
    pub async fn verify(&self, req: &VerificationRequest) -> Result<VerificationResult, ApiError> {
        let assets = self.warehouse.channel_assets(&req.channel_name).await?;
        let resolved = self.warehouse.resolve_videos(&req.video_ids).await?;

        let mut items = Vec::new();
        let mut position = 1u32;

        if req.include_intro {
            if let Some(intro_path) = &assets.intro_path {
                items.push(JobItem::new(Uuid::nil(), position, ItemType::Intro, intro_path.clone()));
                position += 1;
            }
        }

        for video_id in &req.video_ids {
            let mut item = JobItem::new(Uuid::nil(), position, ItemType::Video, "");
            item.video_id = Some(*video_id);
            match resolved.get(video_id) {
                Some(video) => {
                    item.path = video.path.clone();
                    item.title = video.title.clone();
                    if req.enable_logos {
                        item.logo_path = assets.logo_path.clone();
                    }
                }
                None => {
                    item.error = Some("Video ID not found".to_string());
                }
            }
            items.push(item);
            position += 1;
        }

        for manual_path in &req.manual_paths {
            items.push(JobItem::new(Uuid::nil(), position, ItemType::Transition, manual_path.clone()));
            position += 1;
        }

        if req.include_outro {
            if let Some(outro_path) = &assets.outro_path {
                items.push(JobItem::new(Uuid::nil(), position, ItemType::Outro, outro_path.clone()));
            }
        }

        let total_duration = self.probe_items(&mut items).await;

        Ok(VerificationResult { default_logo_path: assets.logo_path, total_duration, items })
    }

    /// Single-path check used by `/jobs/verify-path`.
    pub async fn verify_path(&self, path: &str) -> PathCheckResult {
        let normalized = normalize_many(std::slice::from_ref(&path.to_string()), &self.path_tables);
        let probes = self.probe_pool.probe_many(&normalized).await;
        match probes.get(&normalized[0]).and_then(|p| *p) {
            Some(info) => PathCheckResult { path_available: true, duration: info.duration_s, resolution: info.resolution(), is_4k: info.is_4k() },
            None => PathCheckResult { path_available: false, duration: 0.0, resolution: String::new(), is_4k: false },
        }
    }

    /// Re-probes a caller-supplied, possibly user-edited item list for
    /// `/jobs/revalidate`, in place.
    pub async fn revalidate(&self, items: &mut Vec<JobItem>) -> f64 {
        self.probe_items(items).await
    }

    /// Collects unique source paths in first-seen order (skipping items
    /// already flagged with a catalog error), normalizes and probes them
    /// once each, then fans the results back onto every item.
    async fn probe_items(&self, items: &mut Vec<JobItem>) -> f64 {
        let mut seen = HashSet::new();
        let mut unique_paths = Vec::new();
        for item in items.iter() {
            if item.error.is_some() {
                continue;
            }
            if seen.insert(item.path.clone()) {
                unique_paths.push(item.path.clone());
            }
        }

        let normalized = normalize_many(&unique_paths, &self.path_tables);
        let probes = self.probe_pool.probe_many(&normalized).await;
        let path_to_normalized: HashMap<String, String> =
            unique_paths.into_iter().zip(normalized.into_iter()).collect();

        let mut total_duration = 0.0;
        for item in items.iter_mut() {
            if item.error.is_some() {
                item.path_available = false;
                continue;
            }
            let normalized_path = path_to_normalized.get(&item.path).cloned().unwrap_or_else(|| item.path.clone());
            match probes.get(&normalized_path).and_then(|p| *p) {
                Some(info) => {
                    item.path_available = true;
                    item.duration = info.duration_s;
                    item.resolution = info.resolution();
                    item.is_4k = info.is_4k();
                    total_duration += info.duration_s;
                }
                None => {
                    item.path_available = false;
                    item.error = Some("path not available".to_string());
                }
            }
        }

        total_duration
    }
}
