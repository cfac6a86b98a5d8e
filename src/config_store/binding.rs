//! Camera binding resolution
//!
//! The door_cameras table is authoritative; the `cctv.cameras` section of
//! the config file is consulted only when the table has no row.

use async_trait::async_trait;
use std::sync::Arc;

use super::{CameraBinding, ConfigStore};
use crate::event_store::EventStore;

/// Looks up the camera watching a door
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CameraBindingResolver: Send + Sync {
    async fn get_binding(&self, devname: &str) -> Option<CameraBinding>;
}

/// Resolver over the event store and the config file
pub struct StoreBindingResolver {
    store: Arc<dyn EventStore>,
    config: Arc<ConfigStore>,
}

impl StoreBindingResolver {
    pub fn new(store: Arc<dyn EventStore>, config: Arc<ConfigStore>) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CameraBindingResolver for StoreBindingResolver {
    async fn get_binding(&self, devname: &str) -> Option<CameraBinding> {
        match self.store.get_door_camera(devname).await {
            Ok(Some(camera)) => return Some(camera.into_binding()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(devname = %devname, error = %e, "Door camera lookup failed");
            }
        }

        let cctv = self.config.cctv().await;
        cctv.cameras
            .get(devname)
            .map(|camera| CameraBinding::from_config(devname, camera))
    }
}
