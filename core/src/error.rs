use std::fmt;

use thiserror::Error;

/// Per-field violation messages collected by the schema validators.
///
/// Messages describe the constraint that was broken, never the offending
/// value, so a formatted violation list is always safe to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldViolations {
    violations: Vec<(&'static str, String)>,
}

impl FieldViolations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push((field, message.into()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.violations.iter().map(|(f, m)| (*f, m.as_str()))
    }

    /// Message for a specific field, if it was violated.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&str> {
        self.violations
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, m)| m.as_str())
    }
}

impl fmt::Display for FieldViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

/// Errors produced by the preferences pipeline, classified for retry and
/// user-facing messaging.
#[derive(Error, Debug)]
pub enum PrefsError {
    /// Connectivity / transport failure. Retryable.
    #[error("Network failure: {0}")]
    Network(String),

    /// The backend accepted the request but reported an error. Retryable.
    #[error("Backend failure: {0}")]
    Backend(String),

    /// A payload or response failed structural validation. Never retried.
    #[error("Schema violation: {0}")]
    Schema(FieldViolations),

    /// User input violates a domain constraint. Never retried.
    #[error("Invalid input: {0}")]
    Validation(FieldViolations),
}

impl PrefsError {
    /// Whether a save attempt that failed with this error may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Backend(_))
    }

    /// Stable classification label used in logs and telemetry.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Backend(_) => "backend",
            Self::Schema(_) => "schema",
            Self::Validation(_) => "validation",
        }
    }

    /// One fixed, generic message per classification. Raw backend error text
    /// is never surfaced to the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(_) => "Couldn't reach the server. Check your connection and try again.",
            Self::Backend(_) => "Something went wrong on our side. Please try again.",
            Self::Schema(_) => "Your preferences couldn't be saved. Please try again later.",
            Self::Validation(_) => "Some of your entries look invalid. Please review them.",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PrefsError>;
