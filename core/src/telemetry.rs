//! Telemetry boundary for the preferences pipeline.
//!
//! Hard invariant: event metadata carries only boolean presence flags.
//! Free-text field content (`comfort_notes`, free-text exclusions) must
//! never reach a sink, on any success or failure path.

use tracing::info;

use crate::models::{NewStylePrefs, PrefsPatch};

/// Feature name attached to every event from this pipeline.
pub const FEATURE: &str = "style_prefs";

#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub feature: &'static str,
    pub operation: &'static str,
    /// `"success"` or an error classification label.
    pub outcome: &'static str,
    pub elapsed_ms: u64,
    /// Presence flags only; booleans by construction.
    pub metadata: Vec<(&'static str, bool)>,
}

impl TelemetryEvent {
    /// Flattened `key=value` form, for sinks that log a single field.
    #[must_use]
    pub fn metadata_summary(&self) -> String {
        self.metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// External collector boundary.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that writes events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, event: TelemetryEvent) {
        info!(
            feature = event.feature,
            operation = event.operation,
            outcome = event.outcome,
            elapsed_ms = event.elapsed_ms,
            metadata = %event.metadata_summary(),
            "telemetry event"
        );
    }
}

/// Sink that drops everything. Useful in tests and headless tools.
#[derive(Debug, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Presence flags for a complete row about to be saved.
#[must_use]
pub fn row_metadata(row: &NewStylePrefs) -> Vec<(&'static str, bool)> {
    let has_free_text = row
        .exclusions
        .iter()
        .any(|e| e.starts_with(crate::models::FREE_TEXT_PREFIX));
    vec![
        ("has_days", row.no_repeat_days.is_some()),
        ("has_colour", !row.colour_preferences.is_empty()),
        ("has_exclusions", !row.exclusions.is_empty()),
        ("has_free_text", has_free_text),
        ("has_notes", row.comfort_notes.is_some()),
    ]
}

/// Presence flags for a partial update: which fields the patch touches.
#[must_use]
pub fn patch_metadata(patch: &PrefsPatch) -> Vec<(&'static str, bool)> {
    vec![
        ("sets_days", patch.no_repeat_days.is_some()),
        ("sets_mode", patch.no_repeat_mode.is_some()),
        ("sets_colour", patch.colour_preferences.is_some()),
        ("sets_exclusions", patch.exclusions.is_some()),
        ("sets_notes", patch.comfort_notes.is_some()),
    ]
}
