//! DispatchOrchestrator - Per-Event Pipeline
//!
//! ## Responsibilities
//!
//! - Persist every normalized event before anything else
//! - Push the stored row to live subscribers
//! - Maintain the staff table and its last IN/OUT snapshots
//! - Launch snapshot capture and forwarding as supervised background tasks
//! - Produce the acknowledgment line written back to the sender
//!
//! ## Ordering
//!
//! Persist → broadcast → upsert staff → classify direction → spawn snapshot →
//! filter and spawn forward → acknowledge. Background tasks never delay the
//! acknowledgment and their failures never reach it.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config_store::{ConfigStore, LoggingFlags};
use crate::event_normalizer::NormalizedEvent;
use crate::event_store::EventStore;
use crate::filter_policy::{self, FilterDecision};
use crate::forwarder::EventRelay;
use crate::realtime_hub::LiveNotifier;
use crate::snapshot_service::SnapshotCapture;

/// One JSON line written back per document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Acknowledgment {
    Success {
        id: i64,
        event: String,
        forwarded: bool,
    },
    Error {
        message: String,
    },
}

impl Acknowledgment {
    pub fn invalid_xml() -> Self {
        Acknowledgment::Error {
            message: "Invalid XML format".to_string(),
        }
    }

    pub fn processing_error() -> Self {
        Acknowledgment::Error {
            message: "Error processing event".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Acknowledgment::Success { .. })
    }

    /// Serialized form terminated by `\n`
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"Error processing event"}"#.to_string()
        });
        line.push('\n');
        line
    }
}

/// Entry if the description or device name contains "in", case-insensitive
pub fn is_in_direction(trdesc: &str, devname: &str) -> bool {
    trdesc.to_lowercase().contains("in") || devname.to_lowercase().contains("in")
}

/// Orchestrator over injected collaborators
pub struct DispatchOrchestrator {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn LiveNotifier>,
    snapshots: Arc<dyn SnapshotCapture>,
    relay: Arc<dyn EventRelay>,
    config: Arc<ConfigStore>,
}

impl DispatchOrchestrator {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn LiveNotifier>,
        snapshots: Arc<dyn SnapshotCapture>,
        relay: Arc<dyn EventRelay>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            store,
            notifier,
            snapshots,
            relay,
            config,
        }
    }

    /// Run the pipeline for one event and return its acknowledgment
    pub async fn process(&self, event: NormalizedEvent) -> Acknowledgment {
        self.dispatch(event).await.0
    }

    /// Same as [`process`](Self::process), also returning the supervisors of
    /// the background tasks it launched
    pub async fn dispatch(&self, event: NormalizedEvent) -> (Acknowledgment, Vec<JoinHandle<()>>) {
        let config = self.config.snapshot().await;
        let logging = config.logging.clone();
        let mut tasks = Vec::new();

        // 1. Persist
        let id = match self.store.insert_event(&event).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(devname = %event.devname, error = %e, "Error processing event");
                return (Acknowledgment::processing_error(), tasks);
            }
        };
        tracing::info!(
            event_id = id,
            staffname = %event.staffname,
            trdesc = %event.trdesc,
            "Stored event"
        );

        // 2. Live push
        match self.store.get_event_by_id(id).await {
            Ok(Some(record)) => self.notifier.broadcast_event(&record).await,
            Ok(None) => tracing::warn!(event_id = id, "Stored event not found for broadcast"),
            Err(e) => tracing::warn!(event_id = id, error = %e, "Failed to re-read event for broadcast"),
        }

        // 3. Staff reference
        if let Err(e) = self
            .store
            .upsert_staff(&event.staffno, &event.staffname, event.cardno.clone())
            .await
        {
            tracing::error!(event_id = id, staffno = %event.staffno, error = %e, "Error processing event");
            return (Acknowledgment::processing_error(), tasks);
        }

        // 4. Direction
        let is_in = is_in_direction(&event.trdesc, &event.devname);

        // 5. Snapshot
        if config.cctv.capture_enabled() {
            tasks.push(spawn_supervised(
                "snapshot",
                id,
                capture_snapshot(
                    self.store.clone(),
                    self.snapshots.clone(),
                    logging.clone(),
                    id,
                    event.devname.clone(),
                    event.cardno.clone(),
                    is_in,
                ),
            ));
        }

        // 6. Forward
        let forwarding_enabled = config.forwarding.enabled;
        if forwarding_enabled {
            match filter_policy::evaluate(
                &config.filtering,
                &config.forwarding,
                &event.staffno,
                &event.etype,
                &event.devname,
            ) {
                FilterDecision::Forward => {
                    let relay = self.relay.clone();
                    let policy = config.forwarding.clone();
                    let raw = event.raw_xml().to_string();
                    let logging = logging.clone();

                    tasks.push(spawn_supervised("forward", id, async move {
                        let result = relay.forward(&raw, &policy).await;
                        if result.success {
                            if logging.log_forwarding {
                                tracing::info!(event_id = id, "Event forwarded successfully");
                            }
                        } else {
                            tracing::error!(
                                event_id = id,
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "Failed to forward event"
                            );
                        }
                    }));
                }
                FilterDecision::Skip(reason) => {
                    if logging.log_filtering {
                        tracing::info!(event_id = id, reason = %reason, "Forwarding skipped");
                    }
                    if logging.log_forwarding {
                        tracing::info!(event_id = id, "Event not forwarded: {}", reason);
                    }
                }
            }
        }

        // 7. Acknowledge
        let ack = Acknowledgment::Success {
            id,
            event: event.trdesc.clone(),
            forwarded: forwarding_enabled,
        };
        (ack, tasks)
    }
}

async fn capture_snapshot(
    store: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotCapture>,
    logging: LoggingFlags,
    id: i64,
    devname: String,
    cardno: Option<String>,
    is_in: bool,
) {
    let result = snapshots.capture(&devname, id).await;

    match (
        result.success,
        result.image_path.as_deref().filter(|p| !p.is_empty()),
    ) {
        (true, Some(image_path)) => {
            if let Err(e) = store
                .update_event_snapshot(id, image_path, result.stream_url.clone())
                .await
            {
                tracing::error!(event_id = id, error = %e, "Failed to record snapshot");
                return;
            }
            tracing::info!(event_id = id, image_path = %image_path, "Snapshot captured");

            if let Some(cardno) = cardno.as_deref() {
                match store.update_staff_snapshot(cardno, image_path, is_in).await {
                    Ok(_) => tracing::info!(
                        cardno = %cardno,
                        direction = if is_in { "IN" } else { "OUT" },
                        "Updated staff snapshot"
                    ),
                    Err(e) => {
                        tracing::error!(event_id = id, error = %e, "Failed to update staff snapshot")
                    }
                }
            }
        }
        _ => {
            if let Some(stream_url) = result.stream_url.clone() {
                if let Err(e) = store.update_event_snapshot(id, "", Some(stream_url)).await {
                    tracing::error!(event_id = id, error = %e, "Failed to record stream URL");
                }
            }
            if logging.log_forwarding {
                tracing::info!(
                    event_id = id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Snapshot capture failed"
                );
            }
        }
    }
}

/// Spawn `fut` and log if it panics; the returned handle resolves after it ends
fn spawn_supervised<F>(task: &'static str, event_id: i64, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(task = task, event_id = event_id, "Background task panicked");
            } else {
                tracing::warn!(task = task, event_id = event_id, error = %e, "Background task cancelled");
            }
        }
    })
}
