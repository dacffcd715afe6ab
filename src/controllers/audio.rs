use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        audio::{AudioService, AudioServiceApi, GenerationKey},
        eviction::{EvictionService, EvictionServiceApi, SweepOutcome},
        prefetch::{PrefetchService, PrefetchServiceApi, PRIORITY_PREFETCH},
    },
    error::AppResult,
    infrastructure::repositories::SegmentStore,
};

/// Query for GET /api/audio/segment
#[derive(Debug, Deserialize)]
pub struct SegmentAudioQuery {
    pub document: Uuid,
    pub segment: Uuid,
    pub voice: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SegmentAudioResponse {
    pub object_url: String,
    pub duration_ms: i64,
}

/// Request for POST /api/audio/prefetch
#[derive(Debug, Deserialize)]
pub struct PrefetchRequest {
    pub document_id: Uuid,
    pub segment_ids: Vec<Uuid>,
    pub voice_id: Uuid,
    #[serde(default)]
    pub base_priority: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct PrefetchResponse {
    pub accepted: usize,
}

pub struct AudioController {
    audio_service: Arc<AudioService>,
    prefetch_service: Arc<PrefetchService>,
    eviction_service: Arc<EvictionService>,
    segment_store: Arc<dyn SegmentStore>,
    prefetch_window: i64,
}

impl AudioController {
    pub fn new(
        audio_service: Arc<AudioService>,
        prefetch_service: Arc<PrefetchService>,
        eviction_service: Arc<EvictionService>,
        segment_store: Arc<dyn SegmentStore>,
        prefetch_window: i64,
    ) -> Self {
        Self {
            audio_service,
            prefetch_service,
            eviction_service,
            segment_store,
            prefetch_window,
        }
    }

    /// GET /api/audio/segment - Return or generate the audio for one segment.
    ///
    /// Blocks only for the one segment the listener is waiting on; the next
    /// segments are enqueued for background prefetch.
    pub async fn get_segment_audio(
        State(controller): State<Arc<AudioController>>,
        Query(query): Query<SegmentAudioQuery>,
    ) -> AppResult<Json<SegmentAudioResponse>> {
        let key = GenerationKey::new(query.document, query.segment, query.voice);

        let artifact = controller.audio_service.get_or_generate(key).await?;

        // Keep a rolling window of upcoming segments warming in the
        // background; never block the response on it.
        let prefetch = controller.prefetch_service.clone();
        let segment_store = controller.segment_store.clone();
        let window = controller.prefetch_window;
        tokio::spawn(async move {
            let after_order = match segment_store.find_by_id(key.segment_id).await {
                Ok(Some(segment)) => segment.segment_order,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Could not resolve segment for prefetch window");
                    return;
                }
            };
            prefetch
                .enqueue_following(key.document_id, key.voice_id, after_order, window)
                .await;
        });

        Ok(Json(SegmentAudioResponse {
            object_url: artifact.object_url,
            duration_ms: artifact.duration_ms,
        }))
    }

    /// POST /api/audio/prefetch - Enqueue a batch of segments for background
    /// generation. Degrades to zero accepted when the queue is unavailable.
    pub async fn prefetch_batch(
        State(controller): State<Arc<AudioController>>,
        Json(request): Json<PrefetchRequest>,
    ) -> AppResult<Json<PrefetchResponse>> {
        let accepted = controller
            .prefetch_service
            .enqueue_batch(
                request.document_id,
                &request.segment_ids,
                request.voice_id,
                request.base_priority.unwrap_or(PRIORITY_PREFETCH),
            )
            .await;

        Ok(Json(PrefetchResponse { accepted }))
    }

    /// POST /api/admin/eviction-sweep - Run the TTL and quota passes once.
    pub async fn run_eviction_sweep(
        State(controller): State<Arc<AudioController>>,
    ) -> AppResult<Json<SweepOutcome>> {
        let outcome = controller.eviction_service.run_sweep().await;
        Ok(Json(outcome))
    }
}
