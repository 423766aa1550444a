use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lector::api::{create_router, AppState};
use lector::config::{json_logs_requested, Config};
use lector::db::{Database, DatabaseBackend, LibSqlBackend, TelemetryStore};
use lector::ocr::{RecognitionPool, TesseractFactory};
use lector::services::RetentionManager;
use lector::telemetry::TelemetryRecorder;

#[derive(Parser)]
#[command(name = "lector")]
#[command(about = "Self-hostable OCR service with request telemetry")]
struct Args {
    /// Bind address (overrides LECTOR_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides LECTOR_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let (json_layer, text_layer) = if json_logs_requested() {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lector=info,tower_http=debug".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if config.server.stats_token.is_none() {
        tracing::warn!("STATS_TOKEN is not set; stats endpoints are locked.");
    }

    tracing::info!("Initializing database...");
    let backend = Arc::new(LibSqlBackend::new(Database::new(&config.database).await?));
    let db: Arc<dyn DatabaseBackend> = backend.clone();
    let store: Arc<dyn TelemetryStore> = backend;

    tracing::info!(
        default_language = %config.ocr.default_language,
        handles_per_language = config.ocr.handles_per_language,
        "Initializing recognition pool..."
    );
    let factory = Arc::new(TesseractFactory::new(config.ocr.tessdata_path.clone()));
    let pool = Arc::new(RecognitionPool::new(factory, &config.ocr));

    let cancel_token = CancellationToken::new();

    tracing::info!("Starting telemetry recorder...");
    let (recorder, writer) = TelemetryRecorder::spawn(
        store.clone(),
        config.telemetry.queue_capacity,
        cancel_token.child_token(),
    );

    let state = AppState::new(
        config.clone(),
        db,
        store,
        pool.clone(),
        Arc::new(recorder),
    );

    tracing::info!(
        "Starting retention manager... (days_to_keep={}, interval={}s)",
        config.telemetry.retention_days,
        config.telemetry.retention_interval_secs
    );
    let retention = RetentionManager::new(
        state.aggregator.clone(),
        config.telemetry.retention_days,
        config.telemetry.retention_interval_secs,
    );
    tokio::spawn(retention.run(cancel_token.child_token()));

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Lector starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  OCR upload:   http://{}/api/v1/ocr:process", addr);
    tracing::info!("  API docs:     http://{}/api/v1/docs", addr);
    tracing::info!("  OpenAPI:      http://{}/api/v1/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
    .await?;

    // The signal handler cancels too; this covers the server exiting on its own.
    cancel_token.cancel();

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    match tokio::time::timeout(grace, pool.shutdown_all()).await {
        Ok(terminated) => tracing::info!(terminated, "Recognition pool shut down"),
        Err(_) => {
            tracing::error!(
                grace_secs = grace.as_secs(),
                "Recognition pool did not shut down in time; exiting"
            );
            std::process::exit(1);
        }
    }

    if tokio::time::timeout(grace, writer).await.is_err() {
        tracing::warn!("Telemetry writer did not drain in time; queued events were lost");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
