use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The tuple identifying one cacheable unit of synthesized audio.
/// At most one artifact exists for a key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationKey {
    pub document_id: Uuid,
    pub segment_id: Uuid,
    pub voice_id: Uuid,
}

impl GenerationKey {
    pub fn new(document_id: Uuid, segment_id: Uuid, voice_id: Uuid) -> Self {
        Self {
            document_id,
            segment_id,
            voice_id,
        }
    }

    /// Deterministic job id used by the prefetch queue for idempotent enqueue.
    pub fn job_id(&self) -> String {
        format!("{}:{}:{}", self.document_id, self.segment_id, self.voice_id)
    }
}

impl std::fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.document_id, self.segment_id, self.voice_id
        )
    }
}

/// One cached audio object plus its access metadata.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AudioArtifact {
    pub document_id: Uuid,
    pub segment_id: Uuid,
    pub voice_id: Uuid,
    pub object_url: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub access_count: i64,
}

impl AudioArtifact {
    pub fn key(&self) -> GenerationKey {
        GenerationKey::new(self.document_id, self.segment_id, self.voice_id)
    }

    /// Size estimate in bytes, using duration as a proxy via a fixed bitrate.
    pub fn estimated_bytes(&self) -> i64 {
        let duration_ms = if self.duration_ms > 0 {
            self.duration_ms
        } else {
            DEFAULT_DURATION_MS
        };
        duration_ms / 1000 * ESTIMATED_BYTES_PER_SECOND
    }
}

/// 24 kbit/s proxy bitrate for storage-size estimates.
pub const ESTIMATED_BYTES_PER_SECOND: i64 = 3_000;

/// Fallback duration for artifacts recorded without one.
pub const DEFAULT_DURATION_MS: i64 = 25_000;

/// Immutable unit of source text, produced by the external segmentation step.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Segment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub segment_order: i32,
    pub text: String,
    pub char_start: i32,
    pub char_end: i32,
    pub text_hash: String,
}

/// A named synthesis configuration, owned by the external voice store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Voice {
    pub id: Uuid,
    pub provider: VoiceProvider,
    pub voice_code: String,
    pub language: String,
    #[sqlx(json)]
    pub settings: VoiceSettings,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
pub enum VoiceProvider {
    #[serde(rename = "polly")]
    Polly,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "translate")]
    Translate,
}

impl std::fmt::Display for VoiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceProvider::Polly => write!(f, "polly"),
            VoiceProvider::OpenAi => write!(f, "openai"),
            VoiceProvider::Translate => write!(f, "translate"),
        }
    }
}

/// Opaque provider-specific knobs stored alongside each voice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}
