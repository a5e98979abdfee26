//! PTZ Camserver
//!
//! Main entry point for the camera fleet server.

use ptz_camserver::{
    config_store::ConfigStore,
    event_log_service::{EventLogService, DEFAULT_CAPACITY},
    orchestrator::Orchestrator,
    preview_manager::FfmpegPreviewFactory,
    ptz_controller::DeviceControlFactory,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ptz_camserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PTZ Camserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        camera_config_path = %config.camera_config_path.display(),
        preview_eager = config.preview_eager,
        ffmpeg_path = %config.ffmpeg_path,
        preview_fps = config.preview_fps,
        "Configuration loaded"
    );

    let config_store = Arc::new(ConfigStore::open(&config.camera_config_path).await?);
    let event_log = Arc::new(EventLogService::new(DEFAULT_CAPACITY));

    let orchestrator = Arc::new(Orchestrator::new(
        config_store,
        Arc::new(DeviceControlFactory),
        Arc::new(FfmpegPreviewFactory::new(
            config.ffmpeg_path.clone(),
            config.preview_fps,
        )),
        event_log,
        config.orchestrator_settings(),
    ));
    orchestrator.bootstrap().await;
    tracing::info!("Orchestrator bootstrapped");

    let state = AppState::new(config, orchestrator.clone());
    let app = web_api::build_app(state.clone());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
