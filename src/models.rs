//! Response bodies shared by the dashboard routes

use serde::Serialize;

/// `{"ok": true, "data": ...}` envelope for successful API calls
///
/// Failures are rendered by `Error`'s `IntoResponse` with `ok: false`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// `/health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub db_connected: bool,
    pub websocket_clients: u64,
    pub forwarding_enabled: bool,
    pub snapshot_enabled: bool,
}
