//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, HttpBlobAdapter, InMemoryFavoriteStore, OpenAiImageAdapter,
        PlaceholderImageAdapter, TempImageStore,
    },
    config::{Config, ImageProvider},
    error::ApiError,
    web::{router, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::extract::DefaultBodyLimit;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use logosnap_core::{FavoriteStore, ImageGenerationService, SessionController};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Favorites Storage ---
    let store: Arc<dyn FavoriteStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL not set; favorites will only be kept in memory");
            Arc::new(InMemoryFavoriteStore::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let generator: Arc<dyn ImageGenerationService> = match config.image_provider {
        ImageProvider::OpenAi => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?;
            let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            info!("Using OpenAI image model {}", config.image_model);
            Arc::new(OpenAiImageAdapter::new(
                openai_client,
                config.image_model.clone(),
            ))
        }
        ImageProvider::Placeholder => {
            info!("Using placeholder images");
            Arc::new(PlaceholderImageAdapter::new())
        }
    };

    let temp_images = Arc::new(TempImageStore::new());
    let blobs = Arc::new(HttpBlobAdapter::new(
        reqwest::Client::new(),
        temp_images.clone(),
        config.download_dir.clone(),
    ));

    // --- 4. Create the Session ---
    let session = Arc::new(SessionController::new(
        generator,
        blobs,
        store,
        config.session_config(),
    ));
    session.restore_favorites().await?;

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        session: session.clone(),
        temp_images,
    });

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.clone())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let app = router(app_state)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors);

    // --- 7. Start the Server ---
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // --- 8. Tear Down the Session ---
    session.shutdown().await;
    info!("Server stopped");

    Ok(())
}
