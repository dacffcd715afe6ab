use crate::domain::audio::Segment;
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Read-only view over the segments produced by the external segmentation
/// step. This core never writes segments.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn find_by_id(&self, segment_id: Uuid) -> AppResult<Option<Segment>>;

    /// Segments of a document after `after_order` that have no audio artifact
    /// for `voice_id` yet, in reading order.
    async fn find_missing_after(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        after_order: i32,
        limit: i64,
    ) -> AppResult<Vec<Segment>>;
}

pub struct SegmentRepository {
    pool: Arc<DbPool>,
}

impl SegmentRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentStore for SegmentRepository {
    async fn find_by_id(&self, segment_id: Uuid) -> AppResult<Option<Segment>> {
        let pool = self.pool.as_ref();

        let segment = sqlx::query_as::<_, Segment>(
            r#"
            SELECT id, document_id, segment_order, text, char_start, char_end, text_hash
            FROM segments
            WHERE id = $1
            "#,
        )
        .bind(segment_id)
        .fetch_optional(pool)
        .await?;

        Ok(segment)
    }

    async fn find_missing_after(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        after_order: i32,
        limit: i64,
    ) -> AppResult<Vec<Segment>> {
        let pool = self.pool.as_ref();

        let segments = sqlx::query_as::<_, Segment>(
            r#"
            SELECT s.id, s.document_id, s.segment_order, s.text,
                   s.char_start, s.char_end, s.text_hash
            FROM segments s
            LEFT JOIN audio_artifacts a
                   ON a.segment_id = s.id AND a.voice_id = $2
            WHERE s.document_id = $1
              AND s.segment_order > $3
              AND a.segment_id IS NULL
            ORDER BY s.segment_order
            LIMIT $4
            "#,
        )
        .bind(document_id)
        .bind(voice_id)
        .bind(after_order)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(segments)
    }
}
