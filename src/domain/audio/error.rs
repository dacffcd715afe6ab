use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum AudioServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("generation failed after {attempts} attempts: {reason}")]
    GenerationFailed { attempts: u32, reason: String },
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AppError> for AudioServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => AudioServiceError::NotFound(msg),
            AppError::UploadFailed(msg) => AudioServiceError::UploadFailed(msg),
            _ => AudioServiceError::Store(err.to_string()),
        }
    }
}

impl From<AudioServiceError> for AppError {
    fn from(err: AudioServiceError) -> Self {
        match err {
            AudioServiceError::NotFound(msg) => AppError::NotFound(msg),
            AudioServiceError::GenerationFailed { .. } => {
                AppError::GenerationFailed(err.to_string())
            }
            AudioServiceError::UploadFailed(msg) => AppError::UploadFailed(msg),
            AudioServiceError::Store(msg) => AppError::ExternalService(msg),
            AudioServiceError::Other(e) => AppError::Internal(e.to_string()),
        }
    }
}
