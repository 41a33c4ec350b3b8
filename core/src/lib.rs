//! Core library for attire: a local-first styling-preferences pipeline.
//!
//! The crate is layered the way the data flows:
//!
//! - [`models`] — persisted record, UI form, patch shapes, and the schema
//!   and field validators.
//! - [`mapping`] — pure, total conversions between the record and the form.
//! - [`db`] — SQLite persistence with upsert semantics.
//! - [`cache`] — keyed freshness/retention cache with restorable snapshots.
//! - [`retry`] — backoff policy and the save-attempt state machine.
//! - [`telemetry`] — presence-flag-only event emission.
//! - [`service`] — fetch and save orchestration over a pluggable store.
//! - [`controller`] — screen-level editing, optimistic saves, retry.

pub mod cache;
pub mod controller;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;
pub mod retry;
pub mod service;
pub mod telemetry;

pub use cache::{CachePolicy, PrefsCache};
pub use controller::{PrefsController, SaveStatus};
pub use db::Database;
pub use error::{FieldViolations, PrefsError, Result};
pub use models::{
    Exclusion, NewStylePrefs, NoRepeatMode, PrefsExport, PrefsForm, PrefsPatch, StylePrefs,
};
pub use retry::BackoffPolicy;
pub use service::{FetchState, PrefsService, PrefsStore, SaveRequest};
pub use telemetry::{LogSink, NoopSink, TelemetryEvent, TelemetrySink};
