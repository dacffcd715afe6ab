// In-memory fakes for the pipeline tests. Each fake implements the same
// trait as its production counterpart and keeps enough bookkeeping for
// assertions (call counts, stored objects, scripted failures).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use papervoice_backend::domain::audio::{
    AudioArtifact, AudioService, GenerationKey, Segment, Voice, VoiceProvider, VoiceSettings,
};
use papervoice_backend::error::AppResult;
use papervoice_backend::infrastructure::repositories::{
    ArtifactStore, QuotaUsage, SegmentStore, VoiceStore,
};
use papervoice_backend::infrastructure::storage::{ObjectStorage, StorageError};
use papervoice_backend::infrastructure::tts::{TtsProvider, TtsProviderError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Scriptable synthesis backend: counts calls, optionally sleeps to keep a
/// generation in flight, and pops scripted failures before succeeding.
pub struct FakeTtsProvider {
    calls: AtomicU32,
    failures: Mutex<Vec<TtsProviderError>>,
    delay: Option<Duration>,
}

impl FakeTtsProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Fail the first `failures.len()` calls with the given errors (in
    /// order), then succeed.
    pub fn with_failures(failures: Vec<TtsProviderError>) -> Self {
        let mut reversed = failures;
        reversed.reverse();
        Self {
            calls: AtomicU32::new(0),
            failures: Mutex::new(reversed),
            delay: None,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsProvider for FakeTtsProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice_code: &str,
        _settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.failures.lock().unwrap().pop();
        match scripted {
            Some(error) => Err(error),
            None => Ok(text.as_bytes().to_vec()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryArtifactStore {
    rows: Mutex<HashMap<GenerationKey, AudioArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn contains(&self, key: GenerationKey) -> bool {
        self.rows.lock().unwrap().contains_key(&key)
    }

    /// Insert a fully specified row, bypassing upsert semantics. Used to
    /// back-date artifacts for eviction tests.
    pub fn insert_raw(&self, artifact: AudioArtifact) {
        self.rows.lock().unwrap().insert(artifact.key(), artifact);
    }

    fn sorted_by_recency(rows: &HashMap<GenerationKey, AudioArtifact>) -> Vec<AudioArtifact> {
        let mut all: Vec<AudioArtifact> = rows.values().cloned().collect();
        all.sort_by_key(|a| a.last_access_at.unwrap_or(a.created_at));
        all
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, key: GenerationKey) -> AppResult<Option<AudioArtifact>> {
        Ok(self.rows.lock().unwrap().get(&key).cloned())
    }

    async fn upsert(
        &self,
        key: GenerationKey,
        object_url: &str,
        duration_ms: i64,
    ) -> AppResult<AudioArtifact> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let access_count = rows.get(&key).map(|a| a.access_count).unwrap_or(0) + 1;
        let artifact = AudioArtifact {
            document_id: key.document_id,
            segment_id: key.segment_id,
            voice_id: key.voice_id,
            object_url: object_url.to_string(),
            duration_ms,
            created_at: rows.get(&key).map(|a| a.created_at).unwrap_or(now),
            last_access_at: Some(now),
            access_count,
        };
        rows.insert(key, artifact.clone());
        Ok(artifact)
    }

    async fn touch(&self, key: GenerationKey) -> AppResult<()> {
        if let Some(artifact) = self.rows.lock().unwrap().get_mut(&key) {
            artifact.last_access_at = Some(Utc::now());
            artifact.access_count += 1;
        }
        Ok(())
    }

    async fn list_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>> {
        let rows = self.rows.lock().unwrap();
        let stale = Self::sorted_by_recency(&rows)
            .into_iter()
            .filter(|a| a.last_access_at.unwrap_or(a.created_at) < older_than)
            .take(limit as usize)
            .collect();
        Ok(stale)
    }

    async fn list_over_quota(&self, max_bytes_per_doc_voice: i64) -> AppResult<Vec<QuotaUsage>> {
        let rows = self.rows.lock().unwrap();
        let mut usage: HashMap<(Uuid, Uuid), QuotaUsage> = HashMap::new();

        for artifact in rows.values() {
            let entry = usage
                .entry((artifact.document_id, artifact.voice_id))
                .or_insert(QuotaUsage {
                    document_id: artifact.document_id,
                    voice_id: artifact.voice_id,
                    artifact_count: 0,
                    estimated_bytes: 0,
                });
            entry.artifact_count += 1;
            entry.estimated_bytes += artifact.estimated_bytes();
        }

        Ok(usage
            .into_values()
            .filter(|u| u.estimated_bytes > max_bytes_per_doc_voice)
            .collect())
    }

    async fn list_least_recently_used(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<AudioArtifact>> {
        let rows = self.rows.lock().unwrap();
        let lru = Self::sorted_by_recency(&rows)
            .into_iter()
            .filter(|a| a.document_id == document_id && a.voice_id == voice_id)
            .take(limit as usize)
            .collect();
        Ok(lru)
    }

    async fn delete(&self, key: GenerationKey) -> AppResult<()> {
        self.rows.lock().unwrap().remove(&key);
        Ok(())
    }
}

/// Segment fixtures plus artifact-awareness for `find_missing_after`.
pub struct InMemorySegmentStore {
    segments: Mutex<Vec<Segment>>,
    artifacts: Arc<InMemoryArtifactStore>,
}

impl InMemorySegmentStore {
    pub fn new(artifacts: Arc<InMemoryArtifactStore>) -> Self {
        Self {
            segments: Mutex::new(Vec::new()),
            artifacts,
        }
    }

    pub fn insert(&self, segment: Segment) {
        self.segments.lock().unwrap().push(segment);
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn find_by_id(&self, segment_id: Uuid) -> AppResult<Option<Segment>> {
        Ok(self
            .segments
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == segment_id)
            .cloned())
    }

    async fn find_missing_after(
        &self,
        document_id: Uuid,
        voice_id: Uuid,
        after_order: i32,
        limit: i64,
    ) -> AppResult<Vec<Segment>> {
        let mut missing: Vec<Segment> = self
            .segments
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.document_id == document_id && s.segment_order > after_order)
            .filter(|s| {
                !self
                    .artifacts
                    .contains(GenerationKey::new(document_id, s.id, voice_id))
            })
            .cloned()
            .collect();
        missing.sort_by_key(|s| s.segment_order);
        missing.truncate(limit as usize);
        Ok(missing)
    }
}

#[derive(Default)]
pub struct InMemoryVoiceStore {
    voices: Mutex<HashMap<Uuid, Voice>>,
}

impl InMemoryVoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, voice: Voice) {
        self.voices.lock().unwrap().insert(voice.id, voice);
    }
}

#[async_trait]
impl VoiceStore for InMemoryVoiceStore {
    async fn find_active_by_id(&self, voice_id: Uuid) -> AppResult<Option<Voice>> {
        Ok(self
            .voices
            .lock()
            .unwrap()
            .get(&voice_id)
            .filter(|v| v.active)
            .cloned())
    }
}

pub const STORAGE_BASE: &str = "https://storage.test/object/public/";

/// In-memory object store with switchable upload/delete failure.
#[derive(Default)]
pub struct FakeObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FakeObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public_url(path: &str) -> String {
        format!("{STORAGE_BASE}{path}")
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn put_object(&self, path: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), vec![0u8; 4]);
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStorage for FakeObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("storage returned 503".to_string()));
        }
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(Self::public_url(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Delete("storage returned 503".to_string()));
        }
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn object_path(&self, url: &str) -> Option<String> {
        url.strip_prefix(STORAGE_BASE).map(|rest| rest.to_string())
    }
}

/// Everything a pipeline test needs, wired the way `main` wires production.
pub struct Harness {
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub segments: Arc<InMemorySegmentStore>,
    pub voices: Arc<InMemoryVoiceStore>,
    pub provider: Arc<FakeTtsProvider>,
    pub storage: Arc<FakeObjectStorage>,
    pub audio: Arc<AudioService>,
}

impl Harness {
    pub fn new(provider: FakeTtsProvider, max_attempts: u32, retry_delay: Duration) -> Self {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let segments = Arc::new(InMemorySegmentStore::new(artifacts.clone()));
        let voices = Arc::new(InMemoryVoiceStore::new());
        let provider = Arc::new(provider);
        let storage = Arc::new(FakeObjectStorage::new());

        let audio = Arc::new(AudioService::new(
            artifacts.clone(),
            segments.clone(),
            voices.clone(),
            provider.clone(),
            storage.clone(),
            max_attempts,
            retry_delay,
        ));

        Self {
            artifacts,
            segments,
            voices,
            provider,
            storage,
            audio,
        }
    }

    /// Seed one segment and one active voice; returns the generation key.
    pub fn seed(&self, text: &str) -> GenerationKey {
        let document_id = Uuid::new_v4();
        let segment = segment(document_id, 0, text);
        let voice = voice();
        let key = GenerationKey::new(document_id, segment.id, voice.id);
        self.segments.insert(segment);
        self.voices.insert(voice);
        key
    }
}

pub fn segment(document_id: Uuid, order: i32, text: &str) -> Segment {
    Segment {
        id: Uuid::new_v4(),
        document_id,
        segment_order: order,
        text: text.to_string(),
        char_start: 0,
        char_end: text.len() as i32,
        text_hash: format!("hash-{order}"),
    }
}

pub fn voice() -> Voice {
    Voice {
        id: Uuid::new_v4(),
        provider: VoiceProvider::Polly,
        voice_code: "Lupe".to_string(),
        language: "es".to_string(),
        settings: VoiceSettings::default(),
        active: true,
    }
}

/// A row back-dated by `accessed_days_ago` (or never accessed when `None`,
/// with `created_at` back-dated instead), with its storage object in place.
pub fn aged_artifact(
    storage: &FakeObjectStorage,
    key: GenerationKey,
    duration_ms: i64,
    accessed_days_ago: Option<i64>,
    created_days_ago: i64,
) -> AudioArtifact {
    let path = format!(
        "tts/{}/{}/{}.mp3",
        key.document_id, key.voice_id, key.segment_id
    );
    storage.put_object(&path);

    AudioArtifact {
        document_id: key.document_id,
        segment_id: key.segment_id,
        voice_id: key.voice_id,
        object_url: FakeObjectStorage::public_url(&path),
        duration_ms,
        created_at: Utc::now() - ChronoDuration::days(created_days_ago),
        last_access_at: accessed_days_ago.map(|d| Utc::now() - ChronoDuration::days(d)),
        access_count: 1,
    }
}

/// Poll `condition` until it holds or the timeout expires.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
