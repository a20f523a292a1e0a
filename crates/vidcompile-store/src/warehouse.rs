//! Metadata Gateway (C4): batch read-only interface over the analytics
//! warehouse (`<project>.ybh_assest_path.path` and `.branding_assets`),
//! with an in-process TTL-cached channel list (§4.4, §9's "process-wide
//! mutable channel cache" redesign as a typed, mutex-guarded value).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sqlx::{PgPool, Row};
use uuid::Uuid;

use vidcompile_core::model::ChannelAssets;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub path: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct VideoUpsertRow {
    pub id: Uuid,
    pub path: String,
    pub title: String,
}

/// `{data, timestamp}` guarded by a mutex — the typed replacement for a
/// process-wide mutable global. Readers get a cloned snapshot; a brief
/// double-fetch race at expiry is an accepted tradeoff (§5).
struct ChannelCache {
    data: Option<Vec<String>>,
    fetched_at: Option<Instant>,
}

pub struct WarehouseGateway {
    pool: PgPool,
    ttl: Duration,
    cache: Mutex<ChannelCache>,
}

impl WarehouseGateway {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cache: Mutex::new(ChannelCache { data: None, fetched_at: None }),
        }
    }

    /// Batch lookup by catalog id. Missing ids are simply absent from the
    /// returned map — this never fails a whole batch for one bad id.
    pub async fn resolve_videos(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, ResolvedVideo>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT video_id, path_nyt, video_title FROM path WHERE video_id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("video_id")?;
            out.insert(
                id,
                ResolvedVideo {
                    path: row.try_get("path_nyt")?,
                    title: row.try_get("video_title")?,
                },
            );
        }
        Ok(out)
    }

    pub async fn channel_assets(&self, channel: &str) -> Result<ChannelAssets, StoreError> {
        let row = sqlx::query(
            "SELECT intro_packaging, end_packaging, logo, output_path FROM branding_assets \
             WHERE channel_name = $1",
        )
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => ChannelAssets {
                intro_path: row.try_get("intro_packaging")?,
                outro_path: row.try_get("end_packaging")?,
                logo_path: row.try_get("logo")?,
                production_root: row.try_get("output_path")?,
            },
            None => ChannelAssets::default(),
        })
    }

    pub async fn production_root(&self, channel: &str) -> Result<Option<String>, StoreError> {
        Ok(self.channel_assets(channel).await?.production_root)
    }

    /// Returns the channel name list, preferring a live fetch but falling
    /// back to a stale cache over an empty result on fetch failure.
    pub async fn all_channels(&self) -> Result<Vec<String>, StoreError> {
        if let Some(fresh) = self.cached_if_live() {
            return Ok(fresh);
        }

        match self.fetch_channels().await {
            Ok(names) => {
                let mut cache = self.cache.lock().expect("channel cache mutex poisoned");
                cache.data = Some(names.clone());
                cache.fetched_at = Some(Instant::now());
                Ok(names)
            }
            Err(e) => {
                let cache = self.cache.lock().expect("channel cache mutex poisoned");
                match &cache.data {
                    Some(stale) => {
                        tracing::warn!(error = %e, "channel fetch failed, serving stale cache");
                        Ok(stale.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn cached_if_live(&self) -> Option<Vec<String>> {
        let cache = self.cache.lock().expect("channel cache mutex poisoned");
        let fetched_at = cache.fetched_at?;
        if fetched_at.elapsed() < self.ttl {
            cache.data.clone()
        } else {
            None
        }
    }

    async fn fetch_channels(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT channel_name FROM branding_assets ORDER BY channel_name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| r.try_get::<String, _>("channel_name").map_err(StoreError::from)).collect()
    }

    /// Drops the cached channel list so the next `all_channels` call fetches live.
    pub fn invalidate_channel_cache(&self) {
        let mut cache = self.cache.lock().expect("channel cache mutex poisoned");
        cache.data = None;
        cache.fetched_at = None;
    }

    /// Upserts the whole batch in a single `INSERT ... ON CONFLICT DO
    /// UPDATE`, so a batch of UPDATEs never queues behind a slow streaming
    /// per-row insert loop, and concurrent callers never race a SELECT
    /// against another caller's INSERT for the same id (§4.4). Returns,
    /// for each input row in order, whether it updated an existing row
    /// (`true`) or inserted a new one (`false`).
    pub async fn upsert_videos(&self, rows: &[VideoUpsertRow]) -> Result<Vec<bool>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let paths: Vec<String> = rows.iter().map(|r| r.path.clone()).collect();
        let titles: Vec<String> = rows.iter().map(|r| r.title.clone()).collect();

        let returned = sqlx::query(
            "INSERT INTO path (video_id, path_nyt, video_title) \
             SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[]) \
             ON CONFLICT (video_id) DO UPDATE SET path_nyt = EXCLUDED.path_nyt, video_title = EXCLUDED.video_title \
             RETURNING video_id, (xmax = 0) AS inserted",
        )
        .bind(&ids)
        .bind(&paths)
        .bind(&titles)
        .fetch_all(&self.pool)
        .await?;

        let mut inserted_by_id = HashMap::with_capacity(returned.len());
        for row in returned {
            let id: Uuid = row.try_get("video_id")?;
            let inserted: bool = row.try_get("inserted")?;
            inserted_by_id.insert(id, inserted);
        }

        Ok(ids.iter().map(|id| !inserted_by_id.get(id).copied().unwrap_or(false)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_cache_reports_not_live_before_first_fetch() {
        let cache = ChannelCache { data: None, fetched_at: None };
        assert!(cache.fetched_at.is_none());
    }
}
