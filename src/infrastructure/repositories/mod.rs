pub mod artifact_repository;
pub mod segment_repository;
pub mod voice_repository;

pub use artifact_repository::{ArtifactRepository, ArtifactStore, QuotaUsage};
pub use segment_repository::{SegmentRepository, SegmentStore};
pub use voice_repository::{VoiceRepository, VoiceStore};
