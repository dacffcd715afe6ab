pub mod openai;
pub mod polly;
pub mod translate;

pub use openai::OpenAiProvider;
pub use polly::PollyProvider;
pub use translate::TranslateProvider;

use crate::domain::audio::VoiceSettings;
use crate::infrastructure::config::{Config, TtsProviderChoice};
use async_trait::async_trait;
use std::sync::Arc;

/// Words-per-minute baseline for the duration heuristic.
const BASE_WPM: f64 = 150.0;

/// Errors from a synthesis backend. Transient failures (timeouts, rate
/// limits, 5xx) are retried by the orchestrator; permanent ones (bad
/// credentials, invalid voice code) are not.
#[derive(Debug, thiserror::Error)]
pub enum TtsProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl TtsProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TtsProviderError::Transient(_))
    }
}

/// Uniform interface over interchangeable speech-synthesis backends.
///
/// Implementations are responsible for:
/// - Handling provider-specific text length limitations
/// - Splitting text into chunks if needed
/// - Merging audio chunks into a single MP3 stream
///
/// Retry policy does NOT belong here; the generation orchestrator retries
/// uniformly across providers.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Provider name for logging and health reporting.
    fn name(&self) -> &'static str;

    /// Synthesize text to MP3 audio bytes with the given provider voice code.
    async fn synthesize(
        &self,
        text: &str,
        voice_code: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError>;

    /// Estimate audio duration in milliseconds. An approximation from word
    /// count, not measured audio length; callers must tolerate drift.
    fn estimate_duration_ms(&self, text: &str, rate: Option<&str>) -> i64 {
        estimate_duration_ms(text, rate)
    }
}

/// Word-count duration heuristic shared by all providers.
/// Never negative, never non-finite; 0 for empty text.
pub fn estimate_duration_ms(text: &str, rate: Option<&str>) -> i64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }

    let multiplier = match rate.unwrap_or("medium") {
        "x-slow" => 0.5,
        "slow" => 0.75,
        "medium" => 1.0,
        "fast" => 1.25,
        "x-fast" => 1.5,
        _ => 1.0,
    };

    let adjusted_wpm = BASE_WPM * multiplier;
    let duration_ms = (words as f64 / adjusted_wpm * 60_000.0).round();
    if duration_ms.is_finite() && duration_ms >= 0.0 {
        duration_ms as i64
    } else {
        0
    }
}

/// Split text into chunks of at most `max_len` bytes, respecting sentence
/// boundaries where possible and falling back to a character split for
/// unbroken runs.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    // Split on sentence-ending punctuation
    let sentence_pattern = regex::Regex::new(r"([.!?]+\s+)").unwrap();
    let mut pieces: Vec<&str> = Vec::new();
    let mut last_end = 0;

    for mat in sentence_pattern.find_iter(text) {
        pieces.push(&text[last_end..mat.end()]);
        last_end = mat.end();
    }
    if last_end < text.len() {
        pieces.push(&text[last_end..]);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > max_len {
            push_chunk(&mut chunks, &current);
            current = String::new();
        }

        if piece.len() > max_len {
            // A single sentence longer than the limit is cut at char
            // boundaries, counting bytes so multibyte text stays under it.
            for ch in piece.chars() {
                if current.len() + ch.len_utf8() > max_len {
                    push_chunk(&mut chunks, &current);
                    current = String::new();
                }
                current.push(ch);
            }
        } else {
            current.push_str(piece);
        }
    }

    push_chunk(&mut chunks, &current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// The pure half of provider selection: an explicit override wins, otherwise
/// prefer Polly when AWS credentials are present, then OpenAI when an API key
/// is present, then the credential-free Translate fallback.
fn resolve_choice(
    configured: &TtsProviderChoice,
    has_aws_creds: bool,
    has_openai_key: bool,
) -> TtsProviderChoice {
    match configured {
        TtsProviderChoice::Auto => {
            if has_aws_creds {
                TtsProviderChoice::Polly
            } else if has_openai_key {
                TtsProviderChoice::OpenAi
            } else {
                TtsProviderChoice::Translate
            }
        }
        forced => forced.clone(),
    }
}

/// Build the selected speech backend once at startup.
pub async fn select_provider(config: &Config) -> Arc<dyn TtsProvider> {
    let has_aws_creds = std::env::var("AWS_ACCESS_KEY_ID").is_ok()
        && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    if config.tts_provider != TtsProviderChoice::Auto {
        tracing::info!(provider = ?config.tts_provider, "TTS provider forced by configuration");
    }
    let choice = resolve_choice(&config.tts_provider, has_aws_creds, has_openai_key);

    match choice {
        TtsProviderChoice::Polly | TtsProviderChoice::Auto => {
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.aws_region.clone()))
                .load()
                .await;
            let client = aws_sdk_polly::Client::new(&aws_config);
            tracing::info!(region = %config.aws_region, "Using Polly TTS provider");
            Arc::new(PollyProvider::new(Arc::new(client)))
        }
        TtsProviderChoice::OpenAi => {
            let client = async_openai::Client::new();
            tracing::info!(model = %config.openai_model, "Using OpenAI TTS provider");
            Arc::new(OpenAiProvider::new(
                Arc::new(client),
                config.openai_model.clone(),
            ))
        }
        TtsProviderChoice::Translate => {
            tracing::info!("Using Translate TTS provider (no credentials configured)");
            Arc::new(TranslateProvider::new())
        }
    }
}
