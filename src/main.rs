use papervoice_backend::infrastructure::config::{Config, LogFormat};
use papervoice_backend::infrastructure::db::{check_connection, create_pool, run_migrations};
use papervoice_backend::infrastructure::http::start_http_server;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting PaperVoice Backend on {}:{}",
        config.host,
        config.port
    );

    // Create database connection pool
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    // Verify database connection
    check_connection(&pool).await?;
    tracing::info!("Database connection verified");

    // Apply schema migrations
    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let pool = Arc::new(pool);
    let config = Arc::new(config);

    // Select the speech backend from configuration and credentials
    let provider = papervoice_backend::infrastructure::tts::select_provider(&config).await;
    tracing::info!(provider = provider.name(), "Speech provider selected");

    let storage = Arc::new(
        papervoice_backend::infrastructure::storage::SupabaseStorage::new(
            config.storage_url.clone(),
            config.storage_service_key.clone(),
            config.storage_bucket.clone(),
        ),
    );

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Instantiate repositories (inject db pool)
    tracing::info!("Instantiating repositories...");
    let artifact_repo = Arc::new(
        papervoice_backend::infrastructure::repositories::ArtifactRepository::new(pool.clone()),
    );
    let segment_repo = Arc::new(
        papervoice_backend::infrastructure::repositories::SegmentRepository::new(pool.clone()),
    );
    let voice_repo = Arc::new(
        papervoice_backend::infrastructure::repositories::VoiceRepository::new(pool.clone()),
    );

    // 2. Instantiate the prefetch queue
    let queue = Arc::new(papervoice_backend::infrastructure::queue::JobQueue::new(
        config.queue_enabled,
    ));

    // 3. Instantiate services (inject repositories and clients)
    tracing::info!("Instantiating services...");
    let audio_service = Arc::new(papervoice_backend::domain::audio::AudioService::new(
        artifact_repo.clone(),
        segment_repo.clone(),
        voice_repo.clone(),
        provider,
        storage.clone(),
        config.generation_max_attempts,
        Duration::from_millis(config.generation_retry_delay_ms),
    ));
    let prefetch_service = Arc::new(papervoice_backend::domain::prefetch::PrefetchService::new(
        queue.clone(),
        segment_repo.clone(),
        config.queue_max_attempts,
        Duration::from_millis(config.queue_backoff_ms),
    ));
    let eviction_service = Arc::new(papervoice_backend::domain::eviction::EvictionService::new(
        artifact_repo.clone(),
        storage.clone(),
        config.cache_ttl_days,
        config.max_cache_per_doc_voice_mb * 1024 * 1024,
    ));

    // 4. Start the prefetch worker pool
    let workers = prefetch_service.spawn_workers(audio_service.clone(), config.prefetch_workers);
    tracing::info!(workers = workers.len(), "Prefetch worker pool started");

    // 5. Instantiate controllers (inject services)
    tracing::info!("Instantiating controllers...");
    let audio_controller = Arc::new(papervoice_backend::controllers::AudioController::new(
        audio_service,
        prefetch_service,
        eviction_service,
        segment_repo,
        config.prefetch_window,
    ));

    // Start HTTP server with all routes
    start_http_server(pool, config, audio_controller).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "papervoice_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "papervoice_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
