use super::{split_into_chunks, TtsProvider, TtsProviderError};
use crate::domain::audio::VoiceSettings;
use async_trait::async_trait;

/// The translate endpoint rejects queries longer than 200 characters
const MAX_CHUNK_SIZE: usize = 200;

const ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Credential-free fallback backend using the Google Translate TTS endpoint.
///
/// No real voice selection is possible: every variant of a language maps to
/// the same language code, so voice codes only pick the language. MP3 chunks
/// are concatenated, which is good enough for simple streaming playback.
pub struct TranslateProvider {
    http: reqwest::Client,
}

impl TranslateProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Map a voice code (e.g. "es-MX-DaliaNeural") onto a supported language
    fn language_for(voice_code: &str) -> &'static str {
        let low = voice_code.to_lowercase();
        for lang in ["es", "en", "fr", "de", "it", "pt"] {
            if low == lang || low.starts_with(&format!("{lang}-")) {
                return lang;
            }
        }
        "es"
    }

    async fn fetch_chunk(&self, text: &str, lang: &str) -> Result<Vec<u8>, TtsProviderError> {
        let url = format!(
            "{ENDPOINT}?ie=UTF-8&client=tw-ob&tl={lang}&q={}",
            urlencoding::encode(text)
        );

        let response = self.http.get(&url).send().await.map_err(|e| {
            TtsProviderError::Transient(format!("translate-tts request error: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("translate-tts error {status}: {body}");
            // 4xx other than rate limiting means the request itself is bad
            return if status.is_client_error() && status.as_u16() != 429 {
                Err(TtsProviderError::Permanent(message))
            } else {
                Err(TtsProviderError::Transient(message))
            };
        }

        let bytes = response.bytes().await.map_err(|e| {
            TtsProviderError::Transient(format!("translate-tts body error: {e}"))
        })?;
        Ok(bytes.to_vec())
    }
}

impl Default for TranslateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsProvider for TranslateProvider {
    fn name(&self) -> &'static str {
        "translate"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_code: &str,
        _settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError> {
        let lang = Self::language_for(voice_code);
        let chunks = split_into_chunks(text, MAX_CHUNK_SIZE);

        tracing::debug!(
            lang,
            voice = voice_code,
            chunk_count = chunks.len(),
            "Fetching translate-tts chunks"
        );

        let mut merged_audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let audio = self.fetch_chunk(chunk, lang).await?;
            merged_audio.extend(audio);

            tracing::debug!(
                chunk_index = index,
                total_audio_size = merged_audio.len(),
                "Chunk downloaded"
            );
        }

        tracing::info!(
            provider = "translate",
            lang,
            characters_count = text.len(),
            chunk_count = chunks.len(),
            audio_size_bytes = merged_audio.len(),
            "TTS synthesis completed"
        );

        Ok(merged_audio)
    }
}
