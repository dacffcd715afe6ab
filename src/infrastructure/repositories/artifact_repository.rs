use crate::domain::audio::{AudioArtifact, GenerationKey, DEFAULT_DURATION_MS, ESTIMATED_BYTES_PER_SECOND};
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

/// Estimated cache usage for one (document, voice) pair.
#[derive(Debug, Clone, FromRow)]
pub struct QuotaUsage {
    pub document_id: Uuid,
    pub voice_id: Uuid,
    pub artifact_count: i64,
    pub estimated_bytes: i64,
}

/// The durable audio cache. Maps a generation key to a stored audio object
/// plus access metadata.
///
/// `upsert` must be atomic with respect to concurrent `get`s: a reader never
/// observes a partially written row.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, key: GenerationKey) -> AppResult<Option<AudioArtifact>>;

    /// Insert or replace the artifact for `key`, setting access stats.
    async fn upsert(
        &self,
        key: GenerationKey,
        object_url: &str,
        duration_ms: i64,
    ) -> AppResult<AudioArtifact>;

    /// Bump `last_access_at` and `access_count`. Best-effort from callers.
    async fn touch(&self, key: GenerationKey) -> AppResult<()>;

    /// Artifacts not accessed (or created, if never accessed) since `older_than`.
    async fn list_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>>;

    /// (document, voice) pairs whose estimated total size exceeds the cap.
    async fn list_over_quota(&self, max_bytes_per_doc_voice: i64) -> AppResult<Vec<QuotaUsage>>;

    /// Least-recently-accessed artifacts for one (document, voice) pair.
    async fn list_least_recently_used(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>>;

    async fn delete(&self, key: GenerationKey) -> AppResult<()>;
}

pub struct ArtifactRepository {
    pool: Arc<DbPool>,
}

impl ArtifactRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for ArtifactRepository {
    async fn get(&self, key: GenerationKey) -> AppResult<Option<AudioArtifact>> {
        let pool = self.pool.as_ref();

        let artifact = sqlx::query_as::<_, AudioArtifact>(
            r#"
            SELECT document_id, segment_id, voice_id, object_url, duration_ms,
                   created_at, last_access_at, access_count
            FROM audio_artifacts
            WHERE document_id = $1 AND segment_id = $2 AND voice_id = $3
            "#,
        )
        .bind(key.document_id)
        .bind(key.segment_id)
        .bind(key.voice_id)
        .fetch_optional(pool)
        .await?;

        Ok(artifact)
    }

    async fn upsert(
        &self,
        key: GenerationKey,
        object_url: &str,
        duration_ms: i64,
    ) -> AppResult<AudioArtifact> {
        let pool = self.pool.as_ref();
        let now = Utc::now();

        let artifact = sqlx::query_as::<_, AudioArtifact>(
            r#"
            INSERT INTO audio_artifacts
                (document_id, segment_id, voice_id, object_url, duration_ms,
                 created_at, last_access_at, access_count)
            VALUES ($1, $2, $3, $4, $5, $6, $6, 1)
            ON CONFLICT (document_id, segment_id, voice_id)
            DO UPDATE SET
                object_url = EXCLUDED.object_url,
                duration_ms = EXCLUDED.duration_ms,
                last_access_at = EXCLUDED.last_access_at,
                access_count = audio_artifacts.access_count + 1
            RETURNING document_id, segment_id, voice_id, object_url, duration_ms,
                      created_at, last_access_at, access_count
            "#,
        )
        .bind(key.document_id)
        .bind(key.segment_id)
        .bind(key.voice_id)
        .bind(object_url)
        .bind(duration_ms)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(artifact)
    }

    async fn touch(&self, key: GenerationKey) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query(
            r#"
            UPDATE audio_artifacts
            SET last_access_at = NOW(),
                access_count = access_count + 1
            WHERE document_id = $1 AND segment_id = $2 AND voice_id = $3
            "#,
        )
        .bind(key.document_id)
        .bind(key.segment_id)
        .bind(key.voice_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn list_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>> {
        let pool = self.pool.as_ref();

        let artifacts = sqlx::query_as::<_, AudioArtifact>(
            r#"
            SELECT document_id, segment_id, voice_id, object_url, duration_ms,
                   created_at, last_access_at, access_count
            FROM audio_artifacts
            WHERE COALESCE(last_access_at, created_at) < $1
            ORDER BY COALESCE(last_access_at, created_at) ASC
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(artifacts)
    }

    async fn list_over_quota(&self, max_bytes_per_doc_voice: i64) -> AppResult<Vec<QuotaUsage>> {
        let pool = self.pool.as_ref();

        let pairs = sqlx::query_as::<_, QuotaUsage>(
            r#"
            SELECT document_id,
                   voice_id,
                   COUNT(*) AS artifact_count,
                   SUM(COALESCE(NULLIF(duration_ms, 0), $1) / 1000 * $2)::BIGINT AS estimated_bytes
            FROM audio_artifacts
            GROUP BY document_id, voice_id
            HAVING SUM(COALESCE(NULLIF(duration_ms, 0), $1) / 1000 * $2) > $3
            "#,
        )
        .bind(DEFAULT_DURATION_MS)
        .bind(ESTIMATED_BYTES_PER_SECOND)
        .bind(max_bytes_per_doc_voice)
        .fetch_all(pool)
        .await?;

        Ok(pairs)
    }

    async fn list_least_recently_used(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>> {
        let pool = self.pool.as_ref();

        let artifacts = sqlx::query_as::<_, AudioArtifact>(
            r#"
            SELECT document_id, segment_id, voice_id, object_url, duration_ms,
                   created_at, last_access_at, access_count
            FROM audio_artifacts
            WHERE document_id = $1 AND voice_id = $2
            ORDER BY COALESCE(last_access_at, created_at) ASC
            LIMIT $3
            "#,
        )
        .bind(document_id)
        .bind(voice_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(artifacts)
    }

    async fn delete(&self, key: GenerationKey) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query(
            r#"
            DELETE FROM audio_artifacts
            WHERE document_id = $1 AND segment_id = $2 AND voice_id = $3
            "#,
        )
        .bind(key.document_id)
        .bind(key.segment_id)
        .bind(key.voice_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
