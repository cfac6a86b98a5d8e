//! ConfigStore - Gateway Configuration Snapshots
//!
//! ## Responsibilities
//!
//! - Load forwarding/filtering/CCTV/logging settings from the JSON config file
//! - Hand out immutable snapshots to the pipeline
//! - Reload on demand without disturbing attempts already in flight
//! - Resolve door cameras (door_cameras table first, then config file)

mod binding;
mod types;

pub use binding::{CameraBindingResolver, StoreBindingResolver};
pub use types::*;

#[cfg(test)]
pub use binding::MockCameraBindingResolver;

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// ConfigStore instance
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<GatewayConfig>>,
}

impl ConfigStore {
    /// Load configuration from `path`, falling back to defaults if unreadable
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match read_config(&path).await {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Configuration loaded successfully");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load config, using defaults"
                );
                GatewayConfig::default()
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Create a store around a fixed configuration (no backing file)
    pub fn from_config(config: GatewayConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current configuration snapshot
    pub async fn snapshot(&self) -> Arc<GatewayConfig> {
        self.current.read().await.clone()
    }

    /// CCTV settings snapshot
    pub async fn cctv(&self) -> CctvSettings {
        self.current.read().await.cctv.clone()
    }

    /// Re-read the config file and swap the snapshot
    ///
    /// On failure the previous configuration stays active.
    pub async fn reload(&self) -> Result<Arc<GatewayConfig>> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::Config("no config file to reload".to_string()))?;

        let config = Arc::new(read_config(path).await?);
        *self.current.write().await = config.clone();

        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(config)
    }

    /// Write `config` to the backing file (if any), then swap it in
    pub async fn save(&self, config: GatewayConfig) -> Result<Arc<GatewayConfig>> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&config)?;
            tokio::fs::write(path, json).await?;
            tracing::info!(path = %path.display(), "Configuration saved");
        }

        let config = Arc::new(config);
        *self.current.write().await = config.clone();
        Ok(config)
    }
}

async fn read_config(path: &Path) -> Result<GatewayConfig> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}
