use crate::helpers::{FakeTtsProvider, Harness};
use futures::future::join_all;
use papervoice_backend::domain::audio::{AudioServiceApi, AudioServiceError, GenerationKey};
use papervoice_backend::infrastructure::tts::TtsProviderError;
use pretty_assertions::assert_eq;
use std::time::Duration;
use uuid::Uuid;

const NO_RETRY_DELAY: Duration = Duration::from_millis(0);

#[tokio::test]
async fn it_should_generate_upload_and_record_on_miss() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("Hello from the first segment.");

    let artifact = harness.audio.get_or_generate(key).await.unwrap();

    assert_eq!(harness.provider.call_count(), 1);
    assert!(artifact.object_url.starts_with("https://storage.test/"));
    assert!(artifact.duration_ms > 0);
    assert!(harness.artifacts.contains(key));
    assert_eq!(harness.storage.object_count(), 1);
}

#[tokio::test]
async fn it_should_serve_cached_artifact_without_calling_provider() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("Cached once, served twice.");

    let first = harness.audio.get_or_generate(key).await.unwrap();
    let second = harness.audio.get_or_generate(key).await.unwrap();

    assert_eq!(harness.provider.call_count(), 1);
    assert_eq!(first.object_url, second.object_url);
}

#[tokio::test]
async fn it_should_generate_once_for_concurrent_requests() {
    // Keep the first generation in flight long enough for the others to
    // queue behind the per-key lock.
    let harness = Harness::new(
        FakeTtsProvider::with_delay(Duration::from_millis(50)),
        3,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("Ten listeners, one synthesis.");

    let requests = (0..10).map(|_| {
        let audio = harness.audio.clone();
        async move { audio.get_or_generate(key).await }
    });
    let results = join_all(requests).await;

    assert_eq!(harness.provider.call_count(), 1);
    let urls: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().object_url)
        .collect();
    assert!(urls.iter().all(|u| u == &urls[0]));
}

#[tokio::test]
async fn it_should_retry_transient_failures_until_success() {
    let harness = Harness::new(
        FakeTtsProvider::with_failures(vec![
            TtsProviderError::Transient("timeout".to_string()),
            TtsProviderError::Transient("rate limited".to_string()),
        ]),
        3,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("Third time lucky.");

    let artifact = harness.audio.get_or_generate(key).await.unwrap();

    assert_eq!(harness.provider.call_count(), 3);
    assert!(artifact.duration_ms > 0);
}

#[tokio::test]
async fn it_should_give_up_after_max_attempts() {
    let harness = Harness::new(
        FakeTtsProvider::with_failures(vec![
            TtsProviderError::Transient("timeout".to_string()),
            TtsProviderError::Transient("timeout".to_string()),
        ]),
        2,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("Never makes it.");

    let error = harness.audio.get_or_generate(key).await.unwrap_err();

    assert_eq!(harness.provider.call_count(), 2);
    assert!(matches!(
        error,
        AudioServiceError::GenerationFailed { attempts: 2, .. }
    ));
    // Failures are never cached
    assert!(!harness.artifacts.contains(key));
}

#[tokio::test]
async fn it_should_not_retry_permanent_failures() {
    let harness = Harness::new(
        FakeTtsProvider::with_failures(vec![TtsProviderError::Permanent(
            "invalid voice".to_string(),
        )]),
        3,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("Rejected outright.");

    let error = harness.audio.get_or_generate(key).await.unwrap_err();

    assert_eq!(harness.provider.call_count(), 1);
    assert!(matches!(error, AudioServiceError::GenerationFailed { .. }));
}

#[tokio::test]
async fn it_should_allow_a_fresh_attempt_after_a_failure() {
    let harness = Harness::new(
        FakeTtsProvider::with_failures(vec![TtsProviderError::Transient(
            "timeout".to_string(),
        )]),
        1,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("Fails once, then recovers.");

    assert!(harness.audio.get_or_generate(key).await.is_err());

    // The scripted failure is consumed, so the next request succeeds.
    let artifact = harness.audio.get_or_generate(key).await.unwrap();
    assert_eq!(harness.provider.call_count(), 2);
    assert!(harness.artifacts.contains(key));
    assert!(!artifact.object_url.is_empty());
}

#[tokio::test]
async fn it_should_return_not_found_for_unknown_segment() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = GenerationKey::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let error = harness.audio.get_or_generate(key).await.unwrap_err();

    assert!(matches!(error, AudioServiceError::NotFound(_)));
    assert_eq!(harness.provider.call_count(), 0);
}

#[tokio::test]
async fn it_should_reject_segment_from_another_document() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("Belongs elsewhere.");
    let wrong_document = GenerationKey::new(Uuid::new_v4(), key.segment_id, key.voice_id);

    let error = harness.audio.get_or_generate(wrong_document).await.unwrap_err();

    assert!(matches!(error, AudioServiceError::NotFound(_)));
}

#[tokio::test]
async fn it_should_return_not_found_for_inactive_voice() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("No voice for this one.");

    let mut inactive = crate::helpers::voice();
    inactive.active = false;
    harness.voices.insert(inactive.clone());
    let key = GenerationKey::new(key.document_id, key.segment_id, inactive.id);

    let error = harness.audio.get_or_generate(key).await.unwrap_err();

    assert!(matches!(error, AudioServiceError::NotFound(_)));
}

#[tokio::test]
async fn it_should_not_record_artifact_when_upload_fails() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("Synthesized but never stored.");
    harness.storage.fail_uploads(true);

    let error = harness.audio.get_or_generate(key).await.unwrap_err();

    assert!(matches!(error, AudioServiceError::UploadFailed(_)));
    assert!(!harness.artifacts.contains(key));

    // Once storage recovers the same key generates cleanly.
    harness.storage.fail_uploads(false);
    harness.audio.get_or_generate(key).await.unwrap();
    assert!(harness.artifacts.contains(key));
}

#[tokio::test]
async fn it_should_try_generate_a_cold_key_directly() {
    let harness = Harness::new(FakeTtsProvider::new(), 3, NO_RETRY_DELAY);
    let key = harness.seed("Nobody else wants this one.");

    let artifact = harness.audio.try_get_or_generate(key).await.unwrap();

    assert!(artifact.is_some());
    assert_eq!(harness.provider.call_count(), 1);
    assert!(harness.artifacts.contains(key));
}

#[tokio::test]
async fn it_should_skip_try_generate_while_key_is_in_flight() {
    let harness = Harness::new(
        FakeTtsProvider::with_delay(Duration::from_millis(50)),
        3,
        NO_RETRY_DELAY,
    );
    let key = harness.seed("One in flight, one skipping.");

    let audio = harness.audio.clone();
    let holder = tokio::spawn(async move { audio.get_or_generate(key).await });

    // Give the holder time to take the per-key lock.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let skipped = harness.audio.try_get_or_generate(key).await.unwrap();
    assert!(skipped.is_none());

    holder.await.unwrap().unwrap();
    assert_eq!(harness.provider.call_count(), 1);

    // With nothing in flight it serves the cached artifact.
    let cached = harness.audio.try_get_or_generate(key).await.unwrap();
    assert!(cached.is_some());
}
