//! SnapshotService - Door Camera Image Capture
//!
//! ## Responsibilities
//!
//! - Resolve the camera bound to a door device
//! - ONVIF discovery capture first, direct HTTP snapshot URLs as fallback
//! - Save the JPEG into the snapshot directory and report its filename
//! - Always report the camera's stream URL when one is configured
//!
//! Capture never raises: every outcome is a [`SnapshotResult`].

mod onvif;

pub use onvif::{
    extract_capability_xaddr, extract_xml_attribute, extract_xml_value,
    generate_ws_security_header, DiscoveryCapture, OnvifDiscovery, ONVIF_TIMEOUT,
};

#[cfg(test)]
pub use onvif::MockDiscoveryCapture;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::config_store::{CameraBinding, CameraBindingResolver, ConfigStore};
use crate::error::{Error, Result};

/// Per-URL bound for direct snapshot fetches
pub const DIRECT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Well-known snapshot paths tried in order
pub const DIRECT_SNAPSHOT_PATHS: [&str; 4] = [
    "/cgi-bin/snapshot.cgi",
    "/snapshot.jpg",
    "/snap.jpg",
    "/image/jpeg.cgi",
];

/// Outcome of one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotResult {
    fn captured(image_path: String, stream_url: Option<String>) -> Self {
        Self {
            success: true,
            image_path: Some(image_path),
            stream_url,
            error: None,
        }
    }

    fn failed(error: impl Into<String>, stream_url: Option<String>) -> Self {
        Self {
            success: false,
            image_path: None,
            stream_url,
            error: Some(error.into()),
        }
    }
}

/// Snapshot capability used by the dispatch orchestrator and the web API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotCapture: Send + Sync {
    async fn capture(&self, devname: &str, event_id: i64) -> SnapshotResult;
}

/// SnapshotService instance
pub struct SnapshotService {
    /// HTTP client for direct snapshot URLs
    client: reqwest::Client,
    /// Directory images are written to
    snapshot_dir: PathBuf,
    resolver: Arc<dyn CameraBindingResolver>,
    discovery: Arc<dyn DiscoveryCapture>,
    config: Arc<ConfigStore>,
}

impl SnapshotService {
    /// Create new SnapshotService; creates `snapshot_dir` if missing
    pub async fn new(
        snapshot_dir: PathBuf,
        resolver: Arc<dyn CameraBindingResolver>,
        discovery: Arc<dyn DiscoveryCapture>,
        config: Arc<ConfigStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DIRECT_FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        if fs::metadata(&snapshot_dir).await.is_err() {
            fs::create_dir_all(&snapshot_dir).await?;
            tracing::info!(path = %snapshot_dir.display(), "Created snapshot directory");
        }

        Ok(Self {
            client,
            snapshot_dir,
            resolver,
            discovery,
            config,
        })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Fresh filename for an event image
    fn snapshot_filename(devname: &str, event_id: i64) -> String {
        format!(
            "{}_event_{}_{}.jpg",
            sanitize_devname(devname),
            event_id,
            chrono::Utc::now().timestamp_millis()
        )
    }

    async fn save(&self, devname: &str, event_id: i64, data: &[u8]) -> Result<String> {
        let filename = Self::snapshot_filename(devname, event_id);
        let path = self.snapshot_dir.join(&filename);
        fs::write(&path, data).await?;

        tracing::info!(
            devname = %devname,
            event_id = event_id,
            path = %path.display(),
            size = data.len(),
            "Snapshot saved"
        );
        Ok(filename)
    }

    /// Strategy 2: well-known snapshot paths with Basic auth
    async fn capture_direct(&self, binding: &CameraBinding, event_id: i64) -> SnapshotResult {
        for path in DIRECT_SNAPSHOT_PATHS {
            let url = format!("http://{}:{}{}", binding.host, binding.port, path);

            let data = match self.fetch(&url, binding).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Direct snapshot URL failed");
                    continue;
                }
            };

            // A 2xx answer ends the walk even without an image
            if data.is_empty() {
                return SnapshotResult::failed(
                    format!("Empty snapshot body from {}", url),
                    binding.stream_url.clone(),
                );
            }

            match self.save(&binding.devname, event_id, &data).await {
                Ok(filename) => {
                    return SnapshotResult::captured(filename, binding.stream_url.clone())
                }
                Err(e) => {
                    return SnapshotResult::failed(
                        format!("Failed to save snapshot: {}", e),
                        binding.stream_url.clone(),
                    )
                }
            }
        }

        SnapshotResult::failed("All HTTP snapshot URLs failed", binding.stream_url.clone())
    }

    async fn fetch(&self, url: &str, binding: &CameraBinding) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .basic_auth(&binding.username, Some(&binding.password))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Snapshot(format!(
                "Snapshot HTTP error: {}",
                resp.status()
            )));
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SnapshotCapture for SnapshotService {
    async fn capture(&self, devname: &str, event_id: i64) -> SnapshotResult {
        let cctv = self.config.cctv().await;
        if !cctv.capture_enabled() {
            return SnapshotResult::failed("CCTV capture is disabled", None);
        }

        let binding = match self.resolver.get_binding(devname).await {
            Some(binding) => binding,
            None => {
                tracing::info!(devname = %devname, "No camera configuration found for device");
                return SnapshotResult::failed(
                    format!("No camera configured for device: {}", devname),
                    None,
                );
            }
        };

        if binding.onvif_enabled {
            match self.discovery.attempt_discovery_capture(&binding).await {
                Ok(data) if !data.is_empty() => match self.save(devname, event_id, &data).await {
                    Ok(filename) => {
                        return SnapshotResult::captured(filename, binding.stream_url.clone())
                    }
                    Err(e) => {
                        tracing::warn!(devname = %devname, error = %e, "Failed to save ONVIF snapshot");
                    }
                },
                Ok(_) => {
                    tracing::info!(devname = %devname, "ONVIF returned an empty image, trying HTTP snapshot");
                }
                Err(e) => {
                    tracing::info!(devname = %devname, error = %e, "ONVIF failed, trying HTTP snapshot");
                }
            }
        }

        self.capture_direct(&binding, event_id).await
    }
}

/// Keep `[A-Za-z0-9_-]`, replace anything else with `_`
fn sanitize_devname(devname: &str) -> String {
    let cleaned: String = devname
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "device".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::{GatewayConfig, MockCameraBindingResolver};
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];

    fn enabled_config() -> Arc<ConfigStore> {
        let mut config = GatewayConfig::default();
        config.cctv.enabled = true;
        config.cctv.capture_snapshot = true;
        Arc::new(ConfigStore::from_config(config))
    }

    fn binding(port: u16, onvif: bool) -> CameraBinding {
        CameraBinding {
            devname: "Main Door".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            username: "admin".to_string(),
            password: "secret".to_string(),
            stream_url: Some("rtsp://cam/stream1".to_string()),
            onvif_enabled: onvif,
        }
    }

    fn resolver_returning(b: Option<CameraBinding>) -> Arc<dyn CameraBindingResolver> {
        let mut resolver = MockCameraBindingResolver::new();
        resolver.expect_get_binding().returning(move |_| b.clone());
        Arc::new(resolver)
    }

    fn failing_discovery() -> Arc<dyn DiscoveryCapture> {
        let mut discovery = MockDiscoveryCapture::new();
        discovery
            .expect_attempt_discovery_capture()
            .returning(|_| Err(Error::Onvif("unreachable".to_string())));
        Arc::new(discovery)
    }

    /// Fake camera serving only `/snap.jpg`, requiring Basic auth
    async fn spawn_camera() -> (u16, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));

        async fn snap(State(hits): State<Arc<AtomicUsize>>, headers: HeaderMap) -> (StatusCode, Vec<u8>) {
            hits.fetch_add(1, Ordering::SeqCst);
            // admin:secret
            match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                Some("Basic YWRtaW46c2VjcmV0") => (StatusCode::OK, JPEG.to_vec()),
                _ => (StatusCode::UNAUTHORIZED, Vec::new()),
            }
        }

        let app = Router::new()
            .route("/snap.jpg", get(snap))
            .with_state(hits.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, hits)
    }

    #[tokio::test]
    async fn test_new_creates_snapshot_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("snapshots");
        let service = SnapshotService::new(
            dir.clone(),
            resolver_returning(None),
            failing_discovery(),
            enabled_config(),
        )
        .await
        .unwrap();
        assert!(dir.is_dir());
        assert_eq!(service.snapshot_dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_disabled_capture_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(1, true))),
            failing_discovery(),
            Arc::new(ConfigStore::from_config(GatewayConfig::default())),
        )
        .await
        .unwrap();

        let result = service.capture("Main Door", 1).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("CCTV capture is disabled"));
    }

    #[tokio::test]
    async fn test_unbound_device_reports_failure_without_stream_url() {
        let tmp = tempfile::tempdir().unwrap();
        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(None),
            failing_discovery(),
            enabled_config(),
        )
        .await
        .unwrap();

        let result = service.capture("Side Door", 3).await;
        assert!(!result.success);
        assert!(result.stream_url.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("No camera configured for device: Side Door")
        );
    }

    #[tokio::test]
    async fn test_discovery_success_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut discovery = MockDiscoveryCapture::new();
        discovery
            .expect_attempt_discovery_capture()
            .times(1)
            .returning(|_| Ok(JPEG.to_vec()));

        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(1, true))),
            Arc::new(discovery),
            enabled_config(),
        )
        .await
        .unwrap();

        let result = service.capture("Main Door", 42).await;
        assert!(result.success, "{:?}", result);
        assert_eq!(result.stream_url.as_deref(), Some("rtsp://cam/stream1"));

        let filename = result.image_path.unwrap();
        assert!(filename.starts_with("Main_Door_event_42_"));
        assert!(filename.ends_with(".jpg"));
        assert_eq!(std::fs::read(tmp.path().join(filename)).unwrap(), JPEG);
    }

    #[tokio::test]
    async fn test_falls_back_to_direct_fetch_with_basic_auth() {
        let (port, hits) = spawn_camera().await;
        let tmp = tempfile::tempdir().unwrap();
        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(port, true))),
            failing_discovery(),
            enabled_config(),
        )
        .await
        .unwrap();

        let result = service.capture("Main Door", 7).await;
        assert!(result.success, "{:?}", result);
        // /cgi-bin/snapshot.cgi and /snapshot.jpg 404 before /snap.jpg answers
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let filename = result.image_path.unwrap();
        assert_eq!(std::fs::read(tmp.path().join(filename)).unwrap(), JPEG);
    }

    #[tokio::test]
    async fn test_empty_success_response_stops_the_path_walk() {
        let later_hits = Arc::new(AtomicUsize::new(0));
        let counter = later_hits.clone();
        let app = Router::new()
            .route("/cgi-bin/snapshot.cgi", get(|| async { StatusCode::OK }))
            .route(
                "/snapshot.jpg",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (StatusCode::OK, JPEG.to_vec())
                    }
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let tmp = tempfile::tempdir().unwrap();
        let mut discovery = MockDiscoveryCapture::new();
        discovery.expect_attempt_discovery_capture().never();
        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(port, false))),
            Arc::new(discovery),
            enabled_config(),
        )
        .await
        .unwrap();

        let result = service.capture("Main Door", 1).await;
        assert!(!result.success);
        assert!(result.image_path.is_none());
        assert!(result.error.unwrap().starts_with("Empty snapshot body"));
        assert_eq!(result.stream_url.as_deref(), Some("rtsp://cam/stream1"));
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_onvif_disabled_skips_discovery() {
        let (port, _) = spawn_camera().await;
        let tmp = tempfile::tempdir().unwrap();
        let mut discovery = MockDiscoveryCapture::new();
        discovery.expect_attempt_discovery_capture().never();

        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(port, false))),
            Arc::new(discovery),
            enabled_config(),
        )
        .await
        .unwrap();

        assert!(service.capture("Main Door", 8).await.success);
    }

    #[tokio::test]
    async fn test_all_strategies_fail_keeps_stream_url() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let tmp = tempfile::tempdir().unwrap();
        let service = SnapshotService::new(
            tmp.path().to_path_buf(),
            resolver_returning(Some(binding(port, true))),
            failing_discovery(),
            enabled_config(),
        )
        .await
        .unwrap();

        let result = service.capture("Main Door", 9).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All HTTP snapshot URLs failed"));
        assert_eq!(result.stream_url.as_deref(), Some("rtsp://cam/stream1"));
    }

    #[test]
    fn test_sanitize_devname() {
        assert_eq!(sanitize_devname("Gate 2/North"), "Gate_2_North");
        assert_eq!(sanitize_devname("lobby-01"), "lobby-01");
        assert_eq!(sanitize_devname(""), "device");
    }
}
