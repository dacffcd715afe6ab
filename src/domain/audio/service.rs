use super::error::AudioServiceError;
use super::model::{AudioArtifact, GenerationKey, Segment, Voice};
use crate::infrastructure::repositories::{ArtifactStore, SegmentStore, VoiceStore};
use crate::infrastructure::storage::{audio_object_path, ObjectStorage};
use crate::infrastructure::tts::TtsProvider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// The get-or-generate core: resolves a key to a cached artifact or drives a
/// single synthesis attempt, with at most one generation in flight per key.
pub struct AudioService {
    artifact_store: Arc<dyn ArtifactStore>,
    segment_store: Arc<dyn SegmentStore>,
    voice_store: Arc<dyn VoiceStore>,
    provider: Arc<dyn TtsProvider>,
    storage: Arc<dyn ObjectStorage>,
    // One async mutex per in-flight generation key. Locking per key, not per
    // (document, voice): independent segments may generate concurrently, and
    // the prefetch worker pool is the throttle on the synthesis backend.
    generation_locks: Mutex<HashMap<GenerationKey, Arc<Mutex<()>>>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AudioService {
    pub fn new(
        artifact_store: Arc<dyn ArtifactStore>,
        segment_store: Arc<dyn SegmentStore>,
        voice_store: Arc<dyn VoiceStore>,
        provider: Arc<dyn TtsProvider>,
        storage: Arc<dyn ObjectStorage>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            artifact_store,
            segment_store,
            voice_store,
            provider,
            storage,
            generation_locks: Mutex::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

#[async_trait]
pub trait AudioServiceApi: Send + Sync {
    /// Return the cached artifact for the key, or synthesize, upload and
    /// record it. A caller arriving while another caller is generating the
    /// same key waits for the holder's result.
    async fn get_or_generate(
        &self,
        key: GenerationKey,
    ) -> Result<AudioArtifact, AudioServiceError>;

    /// Same as `get_or_generate`, but never waits behind another generation
    /// of the same key: returns `Ok(None)` when one is already in flight.
    /// Used by queue workers, where a duplicate job should skip, not pile up.
    async fn try_get_or_generate(
        &self,
        key: GenerationKey,
    ) -> Result<Option<AudioArtifact>, AudioServiceError>;
}

#[async_trait]
impl AudioServiceApi for AudioService {
    async fn get_or_generate(
        &self,
        key: GenerationKey,
    ) -> Result<AudioArtifact, AudioServiceError> {
        if let Some(artifact) = self.lookup_cached(key).await? {
            return Ok(artifact);
        }

        let entry = self.lock_entry(key).await;
        let _guard = entry.lock().await;

        let result = self.generate_locked(key).await;

        drop(_guard);
        self.release_entry(key, entry).await;

        result
    }

    async fn try_get_or_generate(
        &self,
        key: GenerationKey,
    ) -> Result<Option<AudioArtifact>, AudioServiceError> {
        if let Some(artifact) = self.lookup_cached(key).await? {
            return Ok(Some(artifact));
        }

        let entry = self.lock_entry(key).await;
        let guard = match entry.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(key = %key, "Generation already in flight, skipping");
                self.release_entry(key, entry).await;
                return Ok(None);
            }
        };

        let result = self.generate_locked(key).await;

        drop(guard);
        self.release_entry(key, entry).await;

        result.map(Some)
    }
}

impl AudioService {
    /// Fast path: store lookup plus a detached access-stat bump on hit.
    /// Must not block on anything beyond the lookup itself.
    async fn lookup_cached(
        &self,
        key: GenerationKey,
    ) -> Result<Option<AudioArtifact>, AudioServiceError> {
        let artifact = self.artifact_store.get(key).await?;

        if let Some(artifact) = artifact {
            tracing::debug!(key = %key, url = %artifact.object_url, "Audio cache hit");
            self.spawn_touch(key);
            return Ok(Some(artifact));
        }

        Ok(None)
    }

    /// Bump access stats without blocking the read path. Failure to record
    /// an access is non-fatal and only logged.
    fn spawn_touch(&self, key: GenerationKey) {
        let store = self.artifact_store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to record artifact access");
            }
        });
    }

    /// The generation body, run under the per-key lock.
    async fn generate_locked(
        &self,
        key: GenerationKey,
    ) -> Result<AudioArtifact, AudioServiceError> {
        // Re-check under the lock: a waiter queued behind the original
        // holder observes its result here instead of generating again.
        if let Some(artifact) = self.artifact_store.get(key).await? {
            self.spawn_touch(key);
            return Ok(artifact);
        }

        let segment = self.find_segment(key).await?;
        let voice = self.find_voice(key).await?;

        tracing::info!(
            key = %key,
            segment_order = segment.segment_order,
            voice = %voice.voice_code,
            provider = self.provider.name(),
            text_length = segment.text.len(),
            "Generating audio"
        );

        let audio_bytes = self.synthesize_with_retry(&segment, &voice, key).await?;

        let path = audio_object_path(key.document_id, key.voice_id, segment.segment_order);
        let object_url = self
            .storage
            .upload(&path, audio_bytes, AUDIO_CONTENT_TYPE)
            .await
            .map_err(|e| {
                tracing::error!(key = %key, path = %path, error = %e, "Audio upload failed");
                AudioServiceError::UploadFailed(e.to_string())
            })?;

        let duration_ms = self
            .provider
            .estimate_duration_ms(&segment.text, voice.settings.rate.as_deref());

        let artifact = self
            .artifact_store
            .upsert(key, &object_url, duration_ms)
            .await?;

        tracing::info!(
            key = %key,
            url = %object_url,
            duration_ms,
            "Audio generated and cached"
        );

        Ok(artifact)
    }

    async fn find_segment(&self, key: GenerationKey) -> Result<Segment, AudioServiceError> {
        self.segment_store
            .find_by_id(key.segment_id)
            .await?
            .filter(|s| s.document_id == key.document_id)
            .ok_or_else(|| {
                AudioServiceError::NotFound(format!("Segment {} not found", key.segment_id))
            })
    }

    async fn find_voice(&self, key: GenerationKey) -> Result<Voice, AudioServiceError> {
        self.voice_store
            .find_active_by_id(key.voice_id)
            .await?
            .ok_or_else(|| {
                AudioServiceError::NotFound(format!("Voice {} not found", key.voice_id))
            })
    }

    /// Bounded retries with a linearly increasing delay. Transient provider
    /// errors are retried; permanent ones fail immediately. Failures are
    /// never cached, so a later request gets a fresh attempt.
    async fn synthesize_with_retry(
        &self,
        segment: &Segment,
        voice: &Voice,
        key: GenerationKey,
    ) -> Result<Vec<u8>, AudioServiceError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self
                .provider
                .synthesize(&segment.text, &voice.voice_code, &voice.settings)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        max_attempts = self.max_attempts,
                        transient = e.is_transient(),
                        error = %e,
                        "Synthesis attempt failed"
                    );
                    let transient = e.is_transient();
                    last_error = e.to_string();

                    if !transient {
                        break;
                    }
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(AudioServiceError::GenerationFailed {
            attempts: self.max_attempts,
            reason: last_error,
        })
    }

    async fn lock_entry(&self, key: GenerationKey) -> Arc<Mutex<()>> {
        let mut locks = self.generation_locks.lock().await;
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once the last interested task lets go of it, so
    /// the lock map does not grow with every key ever generated.
    async fn release_entry(&self, key: GenerationKey, entry: Arc<Mutex<()>>) {
        let mut locks = self.generation_locks.lock().await;
        drop(entry);
        if let Some(current) = locks.get(&key) {
            if Arc::strong_count(current) == 1 {
                locks.remove(&key);
            }
        }
    }
}
