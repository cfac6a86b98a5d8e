//! Door Event Gateway
//!
//! Main entry point: controller TCP ingest plus the dashboard HTTP server.

use door_event_gateway::{
    ingest_server::IngestServer,
    state::{AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "door_event_gateway=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Door Event Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        database_path = %config.database_path.display(),
        config_path = %config.config_path.display(),
        tcp_port = config.tcp_port,
        http_port = config.port,
        "Configuration loaded"
    );

    let tcp_addr = config.tcp_addr()?;
    let http_addr = config.http_addr()?;

    let state = AppState::initialize(config).await?;
    log_pipeline_config(&state).await;

    // Shutdown fan-out: Ctrl-C stops both listeners
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let ingest = IngestServer::new(state.orchestrator.clone());
    let mut ingest_shutdown = shutdown_tx.subscribe();
    let ingest_task = tokio::spawn(async move {
        ingest
            .serve(tcp_addr, async move {
                let _ = ingest_shutdown.recv().await;
            })
            .await
    });

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!("Web server listening on {}", http_addr);

    let mut http_shutdown = shutdown_tx.subscribe();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.recv().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    ingest_task.await??;
    http_task.await??;

    state.store.close().await;
    tracing::info!("Door Event Gateway stopped");
    Ok(())
}

async fn log_pipeline_config(state: &AppState) {
    let config = state.config_store.snapshot().await;

    if config.forwarding.enabled {
        tracing::info!(
            destination = %format!(
                "{}:{}",
                config.forwarding.destination_host, config.forwarding.destination_port
            ),
            protocol = ?config.forwarding.protocol,
            device_filter = %if config.forwarding.filter_devices.is_empty() {
                "ALL DEVICES".to_string()
            } else {
                config.forwarding.filter_devices.join(", ")
            },
            "Forwarding: ENABLED"
        );
    } else {
        tracing::info!("Forwarding: DISABLED");
    }

    if config.filtering.enabled {
        tracing::info!(
            skip_staff = %config.filtering.skip_staff_numbers.join(", "),
            skip_event_types = %config.filtering.skip_event_types.join(", "),
            "Filtering: ENABLED"
        );
    } else {
        tracing::info!("Filtering: DISABLED");
    }

    tracing::info!(
        enabled = config.cctv.capture_enabled(),
        cameras = config.cctv.cameras.len(),
        "Snapshot capture"
    );
}
