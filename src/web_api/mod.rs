//! WebAPI - Dashboard REST API and live feed
//!
//! ## Responsibilities
//!
//! - Event history, staff and door camera endpoints
//! - Gateway config view, update and reload
//! - Manual snapshot test
//! - WebSocket subscription to new events

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .is_ok();
    let config = state.config_store.snapshot().await;

    let response = HealthResponse {
        status: if db_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        db_connected: db_ok,
        websocket_clients: state.realtime.connection_count(),
        forwarding_enabled: config.forwarding.enabled,
        snapshot_enabled: config.cctv.capture_enabled(),
    };

    Json(response)
}
