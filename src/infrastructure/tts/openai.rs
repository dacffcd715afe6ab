use super::{split_into_chunks, TtsProvider, TtsProviderError};
use crate::domain::audio::VoiceSettings;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI has a limit of 4096 characters per request
const MAX_CHUNK_SIZE: usize = 4096;

/// OpenAI speech backend
pub struct OpenAiProvider {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    /// Map a stored voice code onto the fixed OpenAI voice set
    fn voice_from_code(voice_code: &str) -> Voice {
        match voice_code.to_lowercase().as_str() {
            "alloy" => Voice::Alloy,
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "nova" => Voice::Nova,
            "shimmer" => Voice::Shimmer,
            _ => Voice::Alloy, // Default fallback
        }
    }

    /// Map a rate setting onto the API's speed multiplier
    fn speed_from_settings(settings: &VoiceSettings) -> Option<f32> {
        match settings.rate.as_deref() {
            Some("x-slow") => Some(0.5),
            Some("slow") => Some(0.75),
            Some("fast") => Some(1.25),
            Some("x-fast") => Some(1.5),
            _ => None, // Defaults to 1.0
        }
    }

    fn classify_error(e: OpenAIError) -> TtsProviderError {
        match &e {
            OpenAIError::ApiError(api) => {
                // Invalid request parameters will not get better on retry
                if api.r#type.as_deref() == Some("invalid_request_error") {
                    TtsProviderError::Permanent(format!("OpenAI TTS error: {e}"))
                } else {
                    TtsProviderError::Transient(format!("OpenAI TTS error: {e}"))
                }
            }
            _ => TtsProviderError::Transient(format!("OpenAI TTS error: {e}")),
        }
    }

    /// Call the OpenAI speech API for a single text chunk
    async fn call_openai(
        &self,
        text: &str,
        voice_code: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError> {
        let model = match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        };

        let request = CreateSpeechRequest {
            model,
            input: text.to_string(),
            voice: Self::voice_from_code(voice_code),
            response_format: None, // Defaults to MP3
            speed: Self::speed_from_settings(settings),
        };

        let response = self.client.audio().speech(request).await.map_err(|e| {
            tracing::error!(
                error = %e,
                model = %self.model,
                voice = voice_code,
                text_length = text.len(),
                "OpenAI TTS API call failed"
            );
            Self::classify_error(e)
        })?;

        Ok(response.bytes.to_vec())
    }
}

#[async_trait]
impl TtsProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_code: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError> {
        let start_time = std::time::Instant::now();

        let chunks = split_into_chunks(text, MAX_CHUNK_SIZE);
        let mut merged_audio = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let audio_data = self.call_openai(chunk, voice_code, settings).await?;
            merged_audio.extend(audio_data);

            tracing::debug!(
                chunk_index = index,
                total_audio_size = merged_audio.len(),
                "Chunk synthesized and merged"
            );
        }

        tracing::info!(
            provider = "openai",
            voice = voice_code,
            latency_ms = start_time.elapsed().as_millis(),
            characters_count = text.len(),
            chunk_count = chunks.len(),
            audio_size_bytes = merged_audio.len(),
            "TTS synthesis completed"
        );

        Ok(merged_audio)
    }
}
