//! Vehicle Watch
//!
//! Main entry point for the detection engine server.

use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehicle_watch::{
    alert_hub::AlertHub,
    camera_directory::{CameraDirectory, MemoryCameraDirectory},
    camera_supervisor::{CameraSupervisor, WorkerDeps},
    detection_sink::{DetectionSink, JsonlSink, MemorySink},
    frame_source::FfmpegOpener,
    inference_client::{RemoteClassifier, RemoteDetector, RemoteInferenceClient},
    live_state::LiveStateStore,
    state::{AppConfig, AppState},
    web_api,
};

fn build_sink(config: &AppConfig) -> Arc<dyn DetectionSink> {
    match &config.sink_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Detection events persisted to JSONL");
            Arc::new(JsonlSink::new(path.clone()))
        }
        None => {
            tracing::info!(capacity = config.sink_capacity, "Detection events kept in memory");
            Arc::new(MemorySink::new(config.sink_capacity))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_watch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vehicle Watch v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;
    tracing::info!(
        max_cameras = config.max_cameras,
        detection_threshold = config.detection_threshold,
        connect_timeout_sec = config.connect_timeout.as_secs(),
        dedup_window = config.dedup_window,
        dedup_scope = ?config.dedup_scope,
        inference_url = %config.inference_url,
        "Configuration loaded"
    );

    // Capabilities
    let inference = Arc::new(RemoteInferenceClient::new(
        config.inference_url.clone(),
        config.inference_timeout,
    )?);
    let opener = Arc::new(FfmpegOpener::new(
        config.capture_width,
        config.capture_height,
        config.connect_timeout,
    ));

    // Shared stores
    let live_state = Arc::new(LiveStateStore::new());
    let sink = build_sink(&config);
    let alerts = AlertHub::new(config.alert_hub_config());
    let directory: Arc<dyn CameraDirectory> = Arc::new(MemoryCameraDirectory::new());

    let supervisor = Arc::new(CameraSupervisor::new(
        WorkerDeps {
            opener,
            detector: Arc::new(RemoteDetector::new(inference.clone())),
            classifier: Arc::new(RemoteClassifier::new(inference)),
            pipeline_config: config.pipeline_config(),
            live_state: live_state.clone(),
            sink: sink.clone(),
            alerts: alerts.clone(),
            directory: directory.clone(),
            connect_timeout: config.connect_timeout,
        },
        config.max_cameras,
    ));

    let state = AppState {
        config: config.clone(),
        supervisor: supervisor.clone(),
        directory,
        live_state,
        sink,
        alerts: alerts.clone(),
        started_at: Instant::now(),
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // End open alert streams so the server can drain
            alerts.close();
        })
        .await?;

    supervisor.shutdown().await;
    tracing::info!("Vehicle Watch stopped");

    Ok(())
}
