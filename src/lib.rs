//! Door Event Gateway Library
//!
//! Ingests access-control events from door controllers over TCP, stores
//! them, pushes them to dashboards, captures door camera snapshots and
//! relays the original documents downstream.
//!
//! ## Architecture
//!
//! 1. FrameExtractor - Split the controller byte stream into documents
//! 2. EventNormalizer - Validate a document into an event
//! 3. DispatchOrchestrator - Per-event pipeline and acknowledgment
//! 4. SnapshotService - ONVIF capture with direct HTTP fallback
//! 5. EventForwarder - TCP (retried) or HTTP (single attempt) relay
//! 6. FilterPolicy - Forwarding eligibility
//! 7. EventStore - SQLite persistence
//! 8. RealtimeHub - WebSocket distribution
//! 9. ConfigStore - Gateway config snapshots and camera bindings
//! 10. IngestServer - Controller TCP listener
//! 11. WebAPI - Dashboard REST endpoints

pub mod config_store;
pub mod dispatch_orchestrator;
pub mod error;
pub mod event_normalizer;
pub mod event_store;
pub mod filter_policy;
pub mod forwarder;
pub mod frame_extractor;
pub mod ingest_server;
pub mod models;
pub mod realtime_hub;
pub mod snapshot_service;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
