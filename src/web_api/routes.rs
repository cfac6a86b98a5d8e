//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use crate::config_store::GatewayConfig;
use crate::error::{Error, Result};
use crate::event_store::{DoorCamera, EventQuery, EventStore};
use crate::models::ApiResponse;
use crate::snapshot_service::SnapshotCapture;
use crate::state::AppState;

const DEFAULT_EVENT_LIMIT: i64 = 100;
const MAX_EVENT_LIMIT: i64 = 10_000;
const DEFAULT_HISTORY_DAYS: i64 = 7;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let snapshots = ServeDir::new(state.snapshot_service.snapshot_dir());

    Router::new()
        // Health
        .route("/health", get(super::health_check))
        // Events
        .route("/api/events", get(list_recent_events))
        .route("/api/events/all", get(list_event_history))
        .route("/api/events/:id", get(get_event))
        // Staff
        .route("/api/staff", get(list_staff))
        .route("/api/staff/:cardno", get(get_staff_by_card))
        // Door cameras
        .route("/api/door-cameras", get(list_door_cameras).post(save_door_camera))
        .route(
            "/api/door-cameras/:devname",
            get(get_door_camera).delete(delete_door_camera),
        )
        // Gateway config
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/config/reload", post(reload_config))
        // Snapshots
        .route("/api/test-snapshot/:devname", post(test_snapshot))
        .nest_service("/snapshots", snapshots)
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Events
// ========================================

#[derive(Debug, Deserialize)]
struct RecentEventsQuery {
    limit: Option<i64>,
}

async fn list_recent_events(
    State(state): State<AppState>,
    Query(query): Query<RecentEventsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(MAX_EVENT_LIMIT);
    let events = state.store.recent_events(limit).await?;
    Ok(Json(ApiResponse::success(events)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<i64>,
    /// ms since epoch
    from: Option<i64>,
    /// ms since epoch
    to: Option<i64>,
}

/// Explicit range wins over `days`; neither means the last 7 days
async fn list_event_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    let events = if query.from.is_some() || query.to.is_some() {
        state
            .store
            .events_in_range(&EventQuery {
                from: query.from,
                to: query.to,
                limit: None,
            })
            .await?
    } else {
        let days = query.days.filter(|d| *d > 0).unwrap_or(DEFAULT_HISTORY_DAYS);
        state.store.events_from_last_days(days).await?
    };

    tracing::debug!(count = events.len(), "Fetched event history");
    Ok(Json(ApiResponse::success(events)))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let event = state
        .store
        .get_event_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Event {} not found", id)))?;
    Ok(Json(ApiResponse::success(event)))
}

// ========================================
// Staff
// ========================================

async fn list_staff(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let staff = state.store.list_staff().await?;
    Ok(Json(ApiResponse::success(staff)))
}

async fn get_staff_by_card(
    State(state): State<AppState>,
    Path(cardno): Path<String>,
) -> Result<impl IntoResponse> {
    let staff = state
        .store
        .get_staff_by_card(&cardno)
        .await?
        .ok_or_else(|| Error::NotFound("Staff not found".to_string()))?;
    Ok(Json(ApiResponse::success(staff)))
}

// ========================================
// Door cameras
// ========================================

async fn list_door_cameras(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let cameras = state.store.list_door_cameras().await?;
    Ok(Json(ApiResponse::success(cameras)))
}

async fn get_door_camera(
    State(state): State<AppState>,
    Path(devname): Path<String>,
) -> Result<impl IntoResponse> {
    let camera = state
        .store
        .get_door_camera(&devname)
        .await?
        .ok_or_else(|| Error::NotFound("Door camera not found".to_string()))?;
    Ok(Json(ApiResponse::success(camera)))
}

async fn save_door_camera(
    State(state): State<AppState>,
    Json(camera): Json<DoorCamera>,
) -> Result<impl IntoResponse> {
    state.store.upsert_door_camera(&camera).await?;
    tracing::info!(devname = %camera.devname, camera_ip = %camera.camera_ip, "Door camera saved");
    Ok(Json(json!({"ok": true, "message": "Door camera configuration saved"})))
}

async fn delete_door_camera(
    State(state): State<AppState>,
    Path(devname): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.store.delete_door_camera(&devname).await? {
        return Err(Error::NotFound("Door camera not found".to_string()));
    }
    tracing::info!(devname = %devname, "Door camera deleted");
    Ok(Json(json!({"ok": true, "message": "Door camera deleted"})))
}

// ========================================
// Gateway config
// ========================================

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config_store.snapshot().await;
    Json(ApiResponse::success((*config).clone()))
}

/// Partial update of the forwarding and filtering sections
#[derive(Debug, Deserialize)]
struct ConfigUpdateRequest {
    forwarding: Option<Value>,
    filtering: Option<Value>,
}

async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> Result<impl IntoResponse> {
    let current = state.config_store.snapshot().await;
    let updated = merge_sections(&current, req.forwarding, req.filtering)?;
    let saved = state.config_store.save(updated).await?;

    tracing::info!(
        forwarding_enabled = saved.forwarding.enabled,
        filtering_enabled = saved.filtering.enabled,
        "Configuration updated"
    );
    Ok(Json(ApiResponse::success((*saved).clone())))
}

/// Overlay the given keys onto the current sections
fn merge_sections(
    current: &GatewayConfig,
    forwarding: Option<Value>,
    filtering: Option<Value>,
) -> Result<GatewayConfig> {
    let mut doc = serde_json::to_value(current)?;

    for (section, patch) in [("forwarding", forwarding), ("filtering", filtering)] {
        let Some(patch) = patch else { continue };
        let Value::Object(patch) = patch else {
            return Err(Error::Validation(format!("{} must be an object", section)));
        };
        if let Some(Value::Object(target)) = doc.get_mut(section) {
            target.extend(patch);
        }
    }

    serde_json::from_value(doc).map_err(|e| Error::Validation(e.to_string()))
}

async fn reload_config(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let config = state.config_store.reload().await?;
    Ok(Json(ApiResponse::success((*config).clone())))
}

// ========================================
// Snapshot test
// ========================================

/// Capture for a device outside the event flow (event id 0)
async fn test_snapshot(
    State(state): State<AppState>,
    Path(devname): Path<String>,
) -> impl IntoResponse {
    let result = state.snapshot_service.capture(&devname, 0).await;

    if result.success {
        tracing::info!(devname = %devname, image_path = ?result.image_path, "Test snapshot captured");
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Snapshot captured successfully",
                "imagePath": result.image_path,
                "streamUrl": result.stream_url,
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "error": result.error,
                "streamUrl": result.stream_url,
            })),
        )
    }
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime.register().await;

    // Hub -> socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Socket -> nothing; only watches for close
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.realtime.unregister(&conn_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ForwardProtocol;

    #[test]
    fn test_merge_overlays_only_given_keys() {
        let current = GatewayConfig::default();
        let merged = merge_sections(
            &current,
            Some(json!({"enabled": true, "protocol": "http"})),
            None,
        )
        .unwrap();

        assert!(merged.forwarding.enabled);
        assert_eq!(merged.forwarding.protocol, ForwardProtocol::Http);
        assert_eq!(merged.forwarding.destination_port, current.forwarding.destination_port);
        assert_eq!(merged.filtering, current.filtering);
    }

    #[test]
    fn test_merge_rejects_bad_values() {
        let current = GatewayConfig::default();
        assert!(matches!(
            merge_sections(&current, Some(json!({"destinationPort": "four"})), None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            merge_sections(&current, None, Some(json!([1, 2]))),
            Err(Error::Validation(_))
        ));
    }
}
