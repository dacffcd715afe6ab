pub mod error;
pub mod model;
pub mod service;

pub use error::AudioServiceError;
pub use model::{
    AudioArtifact, GenerationKey, Segment, Voice, VoiceProvider, VoiceSettings,
    DEFAULT_DURATION_MS, ESTIMATED_BYTES_PER_SECOND,
};
pub use service::{AudioService, AudioServiceApi};
