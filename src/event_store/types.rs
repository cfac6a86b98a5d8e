//! EventStore data types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config_store::CameraBinding;

/// Persisted access event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub etype: String,
    pub trdesc: String,
    pub staffname: String,
    pub staffno: String,
    pub cardno: Option<String>,
    pub devname: String,
    pub trdate: String,
    pub trtime: String,
    /// Ingestion time, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub raw_xml: Option<String>,
    pub snapshot_path: Option<String>,
    pub stream_url: Option<String>,
}

/// Staff reference row, keyed by staff number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StaffRecord {
    pub staffno: String,
    pub staffname: String,
    pub cardno: Option<String>,
    pub last_in_snapshot: Option<String>,
    pub last_out_snapshot: Option<String>,
    pub last_updated: Option<i64>,
}

/// Door-to-camera mapping row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DoorCamera {
    #[serde(default)]
    pub id: Option<i64>,
    pub devname: String,
    pub camera_ip: String,
    #[serde(default = "default_camera_port")]
    pub camera_port: i64,
    pub camera_username: String,
    pub camera_password: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default = "default_onvif_enabled")]
    pub onvif_enabled: bool,
}

fn default_camera_port() -> i64 {
    80
}

fn default_onvif_enabled() -> bool {
    true
}

impl DoorCamera {
    /// Convert into the binding consumed by the snapshot service
    pub fn into_binding(self) -> CameraBinding {
        CameraBinding {
            devname: self.devname,
            host: self.camera_ip,
            port: u16::try_from(self.camera_port).unwrap_or(80),
            username: self.camera_username,
            password: self.camera_password,
            stream_url: self.stream_url.filter(|s| !s.is_empty()),
            onvif_enabled: self.onvif_enabled,
        }
    }
}

/// Time-window query for the event history API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    /// Inclusive lower bound, ms since epoch
    pub from: Option<i64>,
    /// Inclusive upper bound, ms since epoch
    pub to: Option<i64>,
    pub limit: Option<i64>,
}
