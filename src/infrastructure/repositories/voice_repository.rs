use crate::domain::audio::Voice;
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Read-only view over the voice configuration store.
#[async_trait]
pub trait VoiceStore: Send + Sync {
    /// An active voice by id, or `None` for unknown and deactivated voices.
    async fn find_active_by_id(&self, voice_id: Uuid) -> AppResult<Option<Voice>>;
}

pub struct VoiceRepository {
    pool: Arc<DbPool>,
}

impl VoiceRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoiceStore for VoiceRepository {
    async fn find_active_by_id(&self, voice_id: Uuid) -> AppResult<Option<Voice>> {
        let pool = self.pool.as_ref();

        let voice = sqlx::query_as::<_, Voice>(
            r#"
            SELECT id, provider, voice_code, language, settings, active
            FROM voices
            WHERE id = $1 AND active = true
            "#,
        )
        .bind(voice_id)
        .fetch_optional(pool)
        .await?;

        Ok(voice)
    }
}
