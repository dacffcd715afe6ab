use super::{split_into_chunks, TtsProvider, TtsProviderError};
use crate::domain::audio::VoiceSettings;
use async_trait::async_trait;
use aws_sdk_polly::{
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly has a limit of 3000 characters per request
const MAX_CHUNK_SIZE: usize = 3000;

/// AWS Polly speech backend
pub struct PollyProvider {
    polly_client: Arc<PollyClient>,
}

impl PollyProvider {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Engine selection from voice settings; neural unless the voice asks
    /// for standard explicitly.
    fn engine_for(settings: &VoiceSettings) -> Engine {
        match settings.style.as_deref() {
            Some("standard") => Engine::Standard,
            _ => Engine::Neural,
        }
    }

    /// Call AWS Polly to synthesize a single text chunk
    async fn call_polly(
        &self,
        text: &str,
        voice_code: &str,
        engine: Engine,
    ) -> Result<Vec<u8>, TtsProviderError> {
        let voice_id = VoiceId::from(voice_code);

        tracing::debug!(
            voice = voice_code,
            engine = ?engine,
            text_length = text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(text)
            .voice_id(voice_id)
            .output_format(OutputFormat::Mp3)
            .engine(engine)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                tracing::error!(
                    error = ?service_err,
                    voice = voice_code,
                    text_length = text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                // Bad voice or bad input will not get better on retry
                if service_err.is_invalid_ssml_exception()
                    || service_err.is_text_length_exceeded_exception()
                    || service_err.is_lexicon_not_found_exception()
                    || service_err.is_language_not_supported_exception()
                {
                    TtsProviderError::Permanent(format!("AWS Polly error: {service_err}"))
                } else {
                    TtsProviderError::Transient(format!("AWS Polly error: {service_err}"))
                }
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            TtsProviderError::Transient(format!("Failed to read audio stream: {e}"))
        })?;

        Ok(audio_stream.into_bytes().to_vec())
    }
}

#[async_trait]
impl TtsProvider for PollyProvider {
    fn name(&self) -> &'static str {
        "polly"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_code: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, TtsProviderError> {
        let start_time = std::time::Instant::now();
        let engine = Self::engine_for(settings);

        let chunks = split_into_chunks(text, MAX_CHUNK_SIZE);
        tracing::debug!(
            chunk_count = chunks.len(),
            text_length = text.len(),
            "Text split into chunks"
        );

        let mut merged_audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let audio_data = self.call_polly(chunk, voice_code, engine.clone()).await?;
            merged_audio.extend(audio_data);

            tracing::debug!(
                chunk_index = index,
                total_audio_size = merged_audio.len(),
                "Chunk synthesized and merged"
            );
        }

        let duration = start_time.elapsed();
        tracing::info!(
            provider = "polly",
            voice = voice_code,
            latency_ms = duration.as_millis(),
            characters_count = text.len(),
            chunk_count = chunks.len(),
            audio_size_bytes = merged_audio.len(),
            "TTS synthesis completed"
        );

        Ok(merged_audio)
    }
}
