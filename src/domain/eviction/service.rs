use crate::domain::audio::AudioArtifact;
use crate::infrastructure::repositories::{ArtifactStore, QuotaUsage};
use crate::infrastructure::storage::ObjectStorage;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Upper bound on TTL deletions per sweep.
const TTL_SWEEP_LIMIT: i64 = 1_000;
/// LRU batch size per over-quota (document, voice) pair.
const QUOTA_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepOutcome {
    pub ttl_deleted: u64,
    pub quota_deleted: u64,
}

/// Periodic cache maintenance: TTL removal of unaccessed artifacts and LRU
/// removal for (document, voice) pairs exceeding their storage quota.
/// Triggered externally; both passes are best-effort and idempotent.
pub struct EvictionService {
    artifact_store: Arc<dyn ArtifactStore>,
    storage: Arc<dyn ObjectStorage>,
    ttl: Duration,
    quota_bytes: i64,
}

#[async_trait]
pub trait EvictionServiceApi: Send + Sync {
    async fn run_sweep(&self) -> SweepOutcome;
}

impl EvictionService {
    pub fn new(
        artifact_store: Arc<dyn ArtifactStore>,
        storage: Arc<dyn ObjectStorage>,
        ttl_days: i64,
        quota_bytes: i64,
    ) -> Self {
        Self {
            artifact_store,
            storage,
            ttl: Duration::days(ttl_days),
            quota_bytes,
        }
    }

    /// Delete the backing object first, then the store row. An object-delete
    /// failure keeps the row so a later sweep can retry instead of orphaning
    /// the object.
    async fn delete_artifact(&self, artifact: &AudioArtifact) -> bool {
        let Some(path) = self.storage.object_path(&artifact.object_url) else {
            tracing::warn!(
                key = %artifact.key(),
                url = %artifact.object_url,
                "Artifact URL does not map to a storage path, skipping"
            );
            return false;
        };

        if let Err(e) = self.storage.delete(&path).await {
            tracing::warn!(key = %artifact.key(), path, error = %e, "Object delete failed, keeping row");
            return false;
        }

        if let Err(e) = self.artifact_store.delete(artifact.key()).await {
            tracing::warn!(key = %artifact.key(), error = %e, "Row delete failed");
            return false;
        }

        true
    }

    async fn ttl_pass(&self) -> u64 {
        let cutoff = Utc::now() - self.ttl;

        let stale = match self.artifact_store.list_stale(cutoff, TTL_SWEEP_LIMIT).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(error = %e, "TTL pass could not list stale artifacts");
                return 0;
            }
        };

        if stale.is_empty() {
            tracing::debug!("TTL pass: nothing to evict");
            return 0;
        }

        tracing::info!(candidates = stale.len(), cutoff = %cutoff, "TTL pass starting");

        let mut deleted = 0;
        for artifact in &stale {
            if self.delete_artifact(artifact).await {
                deleted += 1;
            }
        }

        tracing::info!(deleted, candidates = stale.len(), "TTL pass finished");
        deleted
    }

    async fn quota_pass(&self) -> u64 {
        let over_quota = match self.artifact_store.list_over_quota(self.quota_bytes).await {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::error!(error = %e, "Quota pass could not list usage");
                return 0;
            }
        };

        if over_quota.is_empty() {
            tracing::debug!("Quota pass: all pairs under quota");
            return 0;
        }

        tracing::info!(pairs = over_quota.len(), quota_bytes = self.quota_bytes, "Quota pass starting");

        let mut total_deleted = 0;
        for pair in &over_quota {
            total_deleted += self.shrink_pair(pair).await;
        }

        tracing::info!(deleted = total_deleted, "Quota pass finished");
        total_deleted
    }

    /// Delete least-recently-accessed artifacts for one pair until it drops
    /// under quota or the batch is exhausted.
    async fn shrink_pair(&self, pair: &QuotaUsage) -> u64 {
        let lru = match self
            .artifact_store
            .list_least_recently_used(pair.document_id, pair.voice_id, QUOTA_BATCH_SIZE)
            .await
        {
            Ok(lru) => lru,
            Err(e) => {
                tracing::warn!(
                    document_id = %pair.document_id,
                    voice_id = %pair.voice_id,
                    error = %e,
                    "Could not list LRU artifacts for over-quota pair"
                );
                return 0;
            }
        };

        let mut remaining_bytes = pair.estimated_bytes;
        let mut deleted = 0;

        for artifact in &lru {
            if remaining_bytes <= self.quota_bytes {
                break;
            }
            if self.delete_artifact(artifact).await {
                remaining_bytes -= artifact.estimated_bytes();
                deleted += 1;
            }
        }

        tracing::info!(
            document_id = %pair.document_id,
            voice_id = %pair.voice_id,
            deleted,
            estimated_bytes_left = remaining_bytes,
            "Over-quota pair shrunk"
        );

        deleted
    }
}

#[async_trait]
impl EvictionServiceApi for EvictionService {
    async fn run_sweep(&self) -> SweepOutcome {
        tracing::info!("Eviction sweep starting");

        let ttl_deleted = self.ttl_pass().await;
        let quota_deleted = self.quota_pass().await;

        let outcome = SweepOutcome {
            ttl_deleted,
            quota_deleted,
        };
        tracing::info!(
            ttl_deleted = outcome.ttl_deleted,
            quota_deleted = outcome.quota_deleted,
            "Eviction sweep finished"
        );
        outcome
    }
}
