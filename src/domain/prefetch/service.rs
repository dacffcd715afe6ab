use crate::domain::audio::{AudioServiceApi, GenerationKey};
use crate::infrastructure::queue::{JobQueue, QueuedJob};
use crate::infrastructure::repositories::SegmentStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Priority band for synchronous on-demand requests.
pub const PRIORITY_ON_DEMAND: i32 = 10;
/// Priority band for background prefetch; numerically higher so on-demand
/// jobs are never starved behind a large backlog.
pub const PRIORITY_PREFETCH: i32 = 20;

/// Keeps a rolling window of upcoming segments generated ahead of playback.
pub struct PrefetchService {
    queue: Arc<JobQueue>,
    segment_store: Arc<dyn SegmentStore>,
    max_attempts: u32,
    backoff: Duration,
    shutdown: Arc<Notify>,
}

#[async_trait]
pub trait PrefetchServiceApi: Send + Sync {
    /// Enqueue a batch of segments for one document and voice. Earlier
    /// segments in the batch get more urgent priorities. Returns the number
    /// of jobs accepted; duplicates and a disabled queue contribute zero,
    /// never an error.
    async fn enqueue_batch(
        &self,
        document_id: Uuid,
        segment_ids: &[Uuid],
        voice_id: Uuid,
        base_priority: i32,
    ) -> usize;

    /// Enqueue the next `limit` segments after `after_order` that have no
    /// audio for the voice yet, in the background priority band.
    async fn enqueue_following(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        after_order: i32,
        limit: i64,
    ) -> usize;
}

impl PrefetchService {
    pub fn new(
        queue: Arc<JobQueue>,
        segment_store: Arc<dyn SegmentStore>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            queue,
            segment_store,
            max_attempts: max_attempts.max(1),
            backoff,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawn the fixed worker pool draining the queue through the generation
    /// orchestrator.
    pub fn spawn_workers(
        &self,
        audio_service: Arc<dyn AudioServiceApi>,
        concurrency: usize,
    ) -> Vec<JoinHandle<()>> {
        if !self.queue.is_enabled() {
            return Vec::new();
        }

        tracing::info!(concurrency, "Starting prefetch workers");

        (0..concurrency)
            .map(|worker_id| {
                let queue = self.queue.clone();
                let audio_service = audio_service.clone();
                let shutdown = self.shutdown.clone();
                let max_attempts = self.max_attempts;
                let backoff = self.backoff;

                tokio::spawn(async move {
                    loop {
                        let job = tokio::select! {
                            job = queue.next_job() => job,
                            _ = shutdown.notified() => {
                                tracing::debug!(worker_id, "Prefetch worker stopping");
                                break;
                            }
                        };

                        process_job(&*audio_service, &job, max_attempts, backoff).await;
                        queue.complete(&job);
                    }
                })
            })
            .collect()
    }

    /// Ask all workers to stop after their current job.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Run one job through the orchestrator with the queue's own retry policy
/// (exponential backoff, bounded attempts) on top of the orchestrator's
/// internal retries. Attempt counts compose, so both stay small.
async fn process_job(
    audio_service: &dyn AudioServiceApi,
    job: &QueuedJob,
    max_attempts: u32,
    backoff: Duration,
) {
    for attempt in 1..=max_attempts {
        match audio_service.try_get_or_generate(job.key).await {
            Ok(Some(artifact)) => {
                tracing::debug!(
                    job_id = %job.job_id(),
                    url = %artifact.object_url,
                    "Prefetch job completed"
                );
                return;
            }
            Ok(None) => {
                // Another caller is generating this key; its result lands in
                // the cache either way.
                tracing::debug!(job_id = %job.job_id(), "Prefetch job skipped, already in flight");
                return;
            }
            Err(e) => {
                let retryable = !matches!(e, crate::domain::audio::AudioServiceError::NotFound(_));
                tracing::warn!(
                    job_id = %job.job_id(),
                    attempt,
                    max_attempts,
                    error = %e,
                    "Prefetch job attempt failed"
                );
                if !retryable {
                    return;
                }
                if attempt < max_attempts {
                    tokio::time::sleep(backoff * 2u32.pow(attempt - 1)).await;
                }
            }
        }
    }

    tracing::error!(job_id = %job.job_id(), max_attempts, "Prefetch job failed permanently");
}

#[async_trait]
impl PrefetchServiceApi for PrefetchService {
    async fn enqueue_batch(
        &self,
        document_id: Uuid,
        segment_ids: &[Uuid],
        voice_id: Uuid,
        base_priority: i32,
    ) -> usize {
        if !self.queue.is_enabled() {
            tracing::debug!(
                document_id = %document_id,
                count = segment_ids.len(),
                "Queue unavailable, skipping batch enqueue"
            );
            return 0;
        }

        let mut accepted = 0;
        for (index, segment_id) in segment_ids.iter().enumerate() {
            let key = GenerationKey::new(document_id, *segment_id, voice_id);
            if self.queue.enqueue(key, base_priority + index as i32) {
                accepted += 1;
            }
        }

        tracing::info!(
            document_id = %document_id,
            voice_id = %voice_id,
            requested = segment_ids.len(),
            accepted,
            base_priority,
            "Prefetch batch enqueued"
        );

        accepted
    }

    async fn enqueue_following(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        after_order: i32,
        limit: i64,
    ) -> usize {
        if !self.queue.is_enabled() {
            return 0;
        }

        let segments = match self
            .segment_store
            .find_missing_after(document_id, voice_id, after_order, limit)
            .await
        {
            Ok(segments) => segments,
            Err(e) => {
                // Prefetch is best-effort; the on-demand path still works.
                tracing::warn!(
                    document_id = %document_id,
                    error = %e,
                    "Failed to select segments for prefetch"
                );
                return 0;
            }
        };

        if segments.is_empty() {
            return 0;
        }

        let segment_ids: Vec<Uuid> = segments.iter().map(|s| s.id).collect();
        self.enqueue_batch(document_id, &segment_ids, voice_id, PRIORITY_PREFETCH)
            .await
    }
}
