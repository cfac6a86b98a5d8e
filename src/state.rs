//! Application state
//!
//! Holds all shared components and state

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config_store::{ConfigStore, StoreBindingResolver};
use crate::dispatch_orchestrator::DispatchOrchestrator;
use crate::error::{Error, Result};
use crate::event_store::{EventStore, SqliteEventStore};
use crate::forwarder::EventForwarder;
use crate::realtime_hub::RealtimeHub;
use crate::snapshot_service::{OnvifDiscovery, SnapshotService};

/// `database_path` value selecting a private in-memory database
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Gateway JSON config file (forwarding, filtering, cctv, logging)
    pub config_path: PathBuf,
    /// Controller TCP listener host
    pub tcp_host: String,
    /// Controller TCP listener port
    pub tcp_port: u16,
    /// HTTP/WebSocket server host
    pub host: String,
    /// HTTP/WebSocket server port
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/data.db")),
            config_path: std::env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config.json")),
            tcp_host: std::env::var("TCP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            tcp_port: std::env::var("TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

impl AppConfig {
    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.tcp_host, self.tcp_port)
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.host, self.port)
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}:{}: {}", host, port, e)))
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Event, staff and door camera persistence
    pub store: Arc<SqliteEventStore>,
    /// Gateway config snapshots
    pub config_store: Arc<ConfigStore>,
    /// RealtimeHub (WebSocket)
    pub realtime: Arc<RealtimeHub>,
    /// SnapshotService (ONVIF -> direct HTTP)
    pub snapshot_service: Arc<SnapshotService>,
    /// Per-event pipeline shared with the ingest server
    pub orchestrator: Arc<DispatchOrchestrator>,
    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    /// Open storage, load the gateway config and wire every component
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let store = if config.database_path.as_os_str() == IN_MEMORY_DATABASE {
            SqliteEventStore::in_memory().await?
        } else {
            SqliteEventStore::open(&config.database_path).await?
        };
        let store = Arc::new(store);
        tracing::info!(path = %config.database_path.display(), "EventStore initialized");

        let config_store = Arc::new(ConfigStore::load(config.config_path.clone()).await);
        tracing::info!(path = %config.config_path.display(), "ConfigStore initialized");

        let realtime = Arc::new(RealtimeHub::new());

        let snapshot_dir = PathBuf::from(config_store.cctv().await.snapshot_path);
        let resolver = Arc::new(StoreBindingResolver::new(
            store.clone() as Arc<dyn EventStore>,
            config_store.clone(),
        ));
        let snapshot_service = Arc::new(
            SnapshotService::new(
                snapshot_dir,
                resolver,
                Arc::new(OnvifDiscovery::new()?),
                config_store.clone(),
            )
            .await?,
        );
        tracing::info!(
            snapshot_dir = %snapshot_service.snapshot_dir().display(),
            "SnapshotService initialized"
        );

        let orchestrator = Arc::new(DispatchOrchestrator::new(
            store.clone(),
            realtime.clone(),
            snapshot_service.clone(),
            Arc::new(EventForwarder::new()?),
            config_store.clone(),
        ));

        Ok(Self {
            config,
            store,
            config_store,
            realtime,
            snapshot_service,
            orchestrator,
            started_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addresses() {
        let config = AppConfig {
            database_path: PathBuf::from(IN_MEMORY_DATABASE),
            config_path: PathBuf::from("missing.json"),
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: 3001,
            host: "not a host".to_string(),
            port: 3000,
        };
        assert_eq!(config.tcp_addr().unwrap().port(), 3001);
        assert!(matches!(config.http_addr(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_initialize_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.json");
        std::fs::write(
            &config_path,
            format!(
                r#"{{"cctv": {{"snapshotPath": "{}"}}}}"#,
                tmp.path().join("shots").display()
            ),
        )
        .unwrap();

        let state = AppState::initialize(AppConfig {
            database_path: tmp.path().join("db").join("data.db"),
            config_path,
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: 0,
            host: "127.0.0.1".to_string(),
            port: 0,
        })
        .await
        .unwrap();

        assert!(tmp.path().join("db").join("data.db").exists());
        assert!(tmp.path().join("shots").is_dir());
        assert_eq!(state.realtime.connection_count(), 0);
    }
}
