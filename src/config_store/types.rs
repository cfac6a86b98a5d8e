//! ConfigStore data types
//!
//! Gateway configuration as stored in the JSON config file (camelCase keys).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whole gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub forwarding: ForwardingPolicy,
    pub filtering: FilterPolicy,
    pub cctv: CctvSettings,
    pub logging: LoggingFlags,
}

/// Transport used to relay events downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardProtocol {
    /// Raw TCP, retried
    Tcp,
    /// HTTP POST, single attempt
    Http,
}

impl Default for ForwardProtocol {
    fn default() -> Self {
        Self::Tcp
    }
}

/// Forwarding destination and delivery policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwardingPolicy {
    pub enabled: bool,
    pub destination_host: String,
    pub destination_port: u16,
    pub protocol: ForwardProtocol,
    /// Per-attempt timeout in milliseconds
    pub timeout: u64,
    /// Total TCP attempts (0 is treated as 1)
    pub retry_attempts: u32,
    /// Device allow-list; empty forwards every device
    pub filter_devices: Vec<String>,
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            destination_host: "localhost".to_string(),
            destination_port: 4000,
            protocol: ForwardProtocol::Tcp,
            timeout: 5000,
            retry_attempts: 3,
            filter_devices: Vec::new(),
        }
    }
}

/// Forwarding exclusions (never applied to persistence)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterPolicy {
    pub enabled: bool,
    pub skip_staff_numbers: Vec<String>,
    pub skip_event_types: Vec<String>,
}

/// Camera entry from the config file, keyed by device name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    pub host: String,
    #[serde(default = "default_camera_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default = "default_true")]
    pub onvif_enabled: bool,
}

fn default_camera_port() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

/// CCTV snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CctvSettings {
    pub enabled: bool,
    pub capture_snapshot: bool,
    pub snapshot_path: String,
    pub cameras: HashMap<String, CameraConfig>,
}

impl Default for CctvSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            capture_snapshot: false,
            snapshot_path: "./snapshots".to_string(),
            cameras: HashMap::new(),
        }
    }
}

impl CctvSettings {
    /// Snapshot capture runs only when both switches are on
    pub fn capture_enabled(&self) -> bool {
        self.enabled && self.capture_snapshot
    }
}

/// Verbosity switches for side-effect logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingFlags {
    pub log_forwarding: bool,
    pub log_filtering: bool,
}

impl Default for LoggingFlags {
    fn default() -> Self {
        Self {
            log_forwarding: true,
            log_filtering: true,
        }
    }
}

/// Resolved network/credential configuration for the camera at one door
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraBinding {
    pub devname: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub stream_url: Option<String>,
    /// Try ONVIF discovery before direct snapshot URLs
    pub onvif_enabled: bool,
}

impl CameraBinding {
    /// Build a binding from a config-file camera entry
    pub fn from_config(devname: &str, camera: &CameraConfig) -> Self {
        Self {
            devname: devname.to_string(),
            host: camera.host.clone(),
            port: camera.port,
            username: camera.username.clone(),
            password: camera.password.clone(),
            stream_url: camera.stream_url.clone().filter(|s| !s.is_empty()),
            onvif_enabled: camera.onvif_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "forwarding": {
                "enabled": true,
                "destinationHost": "10.0.0.5",
                "destinationPort": 5000,
                "protocol": "http",
                "timeout": 2000,
                "retryAttempts": 5,
                "filterDevices": ["Lobby"]
            },
            "filtering": {
                "enabled": true,
                "skipStaffNumbers": ["E999"],
                "skipEventTypes": ["ALARM"]
            },
            "cctv": {
                "enabled": true,
                "captureSnapshot": true,
                "snapshotPath": "/tmp/snaps",
                "cameras": {
                    "Lobby Door": {
                        "host": "192.168.1.20",
                        "port": 8080,
                        "username": "admin",
                        "password": "secret",
                        "streamUrl": "rtsp://192.168.1.20/live"
                    }
                }
            },
            "logging": { "logForwarding": false, "logFiltering": true }
        }"#;

        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert!(config.forwarding.enabled);
        assert_eq!(config.forwarding.protocol, ForwardProtocol::Http);
        assert_eq!(config.forwarding.retry_attempts, 5);
        assert_eq!(config.filtering.skip_event_types, vec!["ALARM".to_string()]);
        assert!(config.cctv.capture_enabled());
        assert!(!config.logging.log_forwarding);

        let camera = &config.cctv.cameras["Lobby Door"];
        assert_eq!(camera.port, 8080);
        assert!(camera.onvif_enabled);

        let binding = CameraBinding::from_config("Lobby Door", camera);
        assert_eq!(binding.stream_url.as_deref(), Some("rtsp://192.168.1.20/live"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"forwarding": {"enabled": true}}"#).unwrap();
        assert!(config.forwarding.enabled);
        assert_eq!(config.forwarding.destination_port, 4000);
        assert_eq!(config.forwarding.timeout, 5000);
        assert_eq!(config.forwarding.retry_attempts, 3);
        assert!(!config.cctv.capture_enabled());
        assert!(config.logging.log_filtering);
    }
}
