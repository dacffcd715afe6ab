use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Speech synthesis
    pub tts_provider: TtsProviderChoice,
    pub aws_region: String,
    pub openai_model: String,
    pub generation_max_attempts: u32,
    pub generation_retry_delay_ms: u64,
    // Object storage
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,
    // Prefetch queue
    pub queue_enabled: bool,
    pub prefetch_workers: usize,
    pub prefetch_window: i64,
    pub queue_max_attempts: u32,
    pub queue_backoff_ms: u64,
    // Eviction
    pub cache_ttl_days: i64,
    pub max_cache_per_doc_voice_mb: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Which speech backend to use. `Auto` picks based on available credentials.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderChoice {
    Auto,
    Polly,
    OpenAi,
    Translate,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            environment: parse_environment(
                &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            ),
            log_format: parse_log_format(
                &env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            ),
            tts_provider: parse_provider_choice(
                &env::var("TTS_PROVIDER").unwrap_or_else(|_| "auto".to_string()),
            ),
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            openai_model: env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            generation_max_attempts: env::var("GENERATION_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            generation_retry_delay_ms: env::var("GENERATION_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "800".to_string())
                .parse()?,
            storage_url: env::var("STORAGE_URL")?,
            storage_service_key: env::var("STORAGE_SERVICE_KEY")?,
            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "audio-segments".to_string()),
            queue_enabled: parse_enabled_flag(
                &env::var("QUEUE_ENABLED").unwrap_or_else(|_| "true".to_string()),
            ),
            prefetch_workers: env::var("PREFETCH_WORKERS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()?,
            prefetch_window: env::var("PREFETCH_WINDOW")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            queue_max_attempts: env::var("QUEUE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            queue_backoff_ms: env::var("QUEUE_BACKOFF_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            cache_ttl_days: env::var("CACHE_TTL_DAYS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            max_cache_per_doc_voice_mb: env::var("MAX_CACHE_PER_DOC_VOICE_MB")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn parse_environment(value: &str) -> Environment {
    match value {
        "production" => Environment::Production,
        _ => Environment::Development,
    }
}

fn parse_log_format(value: &str) -> LogFormat {
    match value {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn parse_provider_choice(value: &str) -> TtsProviderChoice {
    match value.to_lowercase().as_str() {
        "polly" => TtsProviderChoice::Polly,
        "openai" => TtsProviderChoice::OpenAi,
        "translate" | "free" => TtsProviderChoice::Translate,
        _ => TtsProviderChoice::Auto,
    }
}

/// Anything but an explicit "false" counts as enabled.
fn parse_enabled_flag(value: &str) -> bool {
    value.to_lowercase() != "false"
}
