use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("delete failed: {0}")]
    Delete(String),
}

/// Object storage for synthesized audio. Paths are deterministic per
/// generation key so that repeated uploads overwrite rather than duplicate.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes at `path`, replacing any existing object, and return the
    /// publicly readable URL. The URL must not be handed out before this
    /// call returns success.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Delete the object at `path`.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Recover the storage path from a public URL previously returned by
    /// `upload`, or `None` if the URL does not belong to this store.
    fn object_path(&self, url: &str) -> Option<String>;
}

/// Deterministic, collision-free object path for one generation key.
pub fn audio_object_path(document_id: Uuid, voice_id: Uuid, segment_order: i32) -> String {
    format!("tts/{document_id}/{voice_id}/segment_{segment_order}.mp3")
}

/// Supabase-storage-compatible HTTP client.
pub struct SupabaseStorage {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(base_url: String, service_key: String, bucket: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        }
    }

    fn object_endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();
        let response = self
            .http
            .post(self.object_endpoint(path))
            .bearer_auth(&self.service_key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!(
                "storage returned {status}: {body}"
            )));
        }

        tracing::debug!(path, size, "Audio object uploaded");
        Ok(self.public_url(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(self.object_endpoint(path))
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Delete(format!(
                "storage returned {status}: {body}"
            )));
        }

        tracing::debug!(path, "Audio object deleted");
        Ok(())
    }

    fn object_path(&self, url: &str) -> Option<String> {
        let prefix = format!(
            "{}/storage/v1/object/public/{}/",
            self.base_url, self.bucket
        );
        url.strip_prefix(&prefix)
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
    }
}
