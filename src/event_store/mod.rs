//! EventStore - Event, Staff and Door Camera Persistence
//!
//! ## Responsibilities
//!
//! - Append every normalized event and assign its identifier
//! - Record snapshot results against an event after the fact
//! - Maintain the staff reference table (last IN/OUT snapshots)
//! - Hold the door-to-camera mapping
//!
//! Writes are serialized by SQLite; callers never coordinate among themselves.

mod repository;
mod types;

pub use repository::SqliteEventStore;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::event_normalizer::NormalizedEvent;

/// Persistence operations the ingest pipeline depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store an event and return its new, monotonically increasing id
    async fn insert_event(&self, event: &NormalizedEvent) -> Result<i64>;

    /// Fetch one stored event
    async fn get_event_by_id(&self, id: i64) -> Result<Option<EventRecord>>;

    /// Set snapshot path and stream URL; false if no such event
    async fn update_event_snapshot(
        &self,
        id: i64,
        snapshot_path: &str,
        stream_url: Option<String>,
    ) -> Result<bool>;

    /// Insert or refresh a staff row; an absent card number keeps the stored one
    async fn upsert_staff(&self, staffno: &str, staffname: &str, cardno: Option<String>)
        -> Result<()>;

    /// Record the last IN or OUT snapshot for a card holder; false if unknown card
    async fn update_staff_snapshot(&self, cardno: &str, snapshot_path: &str, is_in: bool)
        -> Result<bool>;

    /// Door camera mapping for a device name
    async fn get_door_camera(&self, devname: &str) -> Result<Option<DoorCamera>>;
}
