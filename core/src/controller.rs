//! Screen-level orchestration of the preferences form.
//!
//! Owns the editable form, drives loads and saves through [`PrefsService`],
//! and applies the optimistic-update protocol: speculatively publish the
//! change, and on failure roll back both the cache and the form to the
//! pre-change baseline. The attempted form is stashed so a retry resends
//! exactly what failed, not whatever the user has typed since.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::PrefsError;
use crate::mapping;
use crate::models::{PrefsForm, validate_no_repeat_days};
use crate::service::{FetchState, PrefsService, SaveRequest};

/// How long the "saved" indicator stays visible after a successful save.
pub const SUCCESS_INDICATOR: Duration = Duration::from_secs(2);

/// Screen save status. `Saving` is transient within [`PrefsController::save`];
/// between calls the screen is either clean or showing a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Clean,
    Saving,
    ErrorWithRetry,
}

pub struct PrefsController {
    service: PrefsService,
    user_id: String,
    form: PrefsForm,
    /// Form as last confirmed by the backend; `None` until the first load.
    /// Doubles as the delta baseline for saves.
    loaded_form: Option<PrefsForm>,
    status: SaveStatus,
    pending_retry: Option<SaveRequest>,
    last_error: Option<PrefsError>,
    days_error: Option<String>,
    success_until: Option<Instant>,
}

impl PrefsController {
    #[must_use]
    pub fn new(service: PrefsService, user_id: &str) -> Self {
        Self {
            service,
            user_id: user_id.to_string(),
            form: PrefsForm::default(),
            loaded_form: None,
            status: SaveStatus::Clean,
            pending_retry: None,
            last_error: None,
            days_error: None,
            success_until: None,
        }
    }

    /// Load the stored record and populate the form. A user with no record
    /// gets the default form.
    pub fn load(&mut self) -> Result<(), PrefsError> {
        match self.service.get_prefs(Some(&self.user_id))? {
            FetchState::Disabled => {
                // Unreachable with an identity supplied; keep the defaults.
                debug!("fetch disabled despite identity");
            }
            FetchState::Loaded(record) => {
                self.form = mapping::to_form(record.as_ref());
                self.loaded_form = Some(self.form.clone());
            }
        }
        Ok(())
    }

    // --- Form field editing ---

    #[must_use]
    pub fn form(&self) -> &PrefsForm {
        &self.form
    }

    pub fn set_colour_tendency(&mut self, tag: &str) {
        self.form.colour_tendency = tag.to_string();
    }

    pub fn toggle_checklist(&mut self, tag: &str) {
        if let Some(pos) = self.form.checklist.iter().position(|t| t == tag) {
            self.form.checklist.remove(pos);
        } else {
            self.form.checklist.push(tag.to_string());
        }
    }

    pub fn set_free_text(&mut self, text: &str) {
        self.form.free_text = text.to_string();
    }

    /// Inline-validated days input. Out-of-range input sets a field error
    /// and leaves the form value untouched.
    pub fn set_no_repeat_days(&mut self, days: i64) {
        match validate_no_repeat_days(days) {
            Ok(days) => {
                self.form.no_repeat_days = days;
                self.days_error = None;
            }
            Err(message) => {
                self.days_error = Some(message);
            }
        }
    }

    pub fn set_no_repeat_mode(&mut self, mode: crate::models::NoRepeatMode) {
        self.form.no_repeat_mode = mode;
    }

    pub fn set_comfort_notes(&mut self, notes: &str) {
        self.form.comfort_notes = notes.to_string();
    }

    #[must_use]
    pub fn days_error(&self) -> Option<&str> {
        self.days_error.as_deref()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match &self.loaded_form {
            Some(loaded) => !mapping::changed_fields(&self.form, loaded).is_empty(),
            None => mapping::has_any_data(&self.form),
        }
    }

    // --- Saving ---

    /// Save the current form. Returns the resulting status; on failure the
    /// attempted form is stashed for [`retry`](Self::retry).
    pub fn save(&mut self) -> SaveStatus {
        if self.days_error.is_some() {
            // The field error is already on screen; don't stack a save error
            // on top of it.
            return self.status;
        }
        let request = SaveRequest {
            user_id: self.user_id.clone(),
            new_form: self.form.clone(),
            previous_form: self.loaded_form.clone(),
        };
        self.attempt(request)
    }

    /// Resend the exact form that last failed. The editable form (reverted
    /// to the baseline by the failure, possibly edited since) is not part of
    /// the resend. Returns `None` when there is nothing to retry.
    pub fn retry(&mut self) -> Option<SaveStatus> {
        let request = self.pending_retry.clone()?;
        Some(self.attempt(request))
    }

    fn attempt(&mut self, request: SaveRequest) -> SaveStatus {
        self.status = SaveStatus::Saving;
        self.success_until = None;

        // Optimistic publish; the snapshot restores the cache verbatim if
        // the save ultimately fails.
        let snapshot = self.service.cache_snapshot(&self.user_id);
        self.service.cache_optimistic(&self.user_id, &request.new_form);

        match self.service.save_prefs(&request) {
            Ok(_) => {
                self.loaded_form = Some(request.new_form);
                self.pending_retry = None;
                self.last_error = None;
                self.status = SaveStatus::Clean;
                self.success_until = Some(Instant::now() + SUCCESS_INDICATOR);
            }
            Err(err) => {
                self.service.restore_cache(snapshot);
                // Full rollback: the form reverts to the confirmed baseline;
                // the attempted values survive only in `pending_retry`.
                self.form = self.loaded_form.clone().unwrap_or_default();
                self.last_error = Some(err);
                self.pending_retry = Some(request);
                self.status = SaveStatus::ErrorWithRetry;
            }
        }
        self.status
    }

    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.status
    }

    /// Generic, non-technical message for the current error, if any. Backend
    /// detail never reaches this surface.
    #[must_use]
    pub fn error_message(&self) -> Option<&'static str> {
        self.last_error.as_ref().map(PrefsError::user_message)
    }

    /// Whether the transient "saved" indicator should currently show.
    #[must_use]
    pub fn saved_recently(&self) -> bool {
        self.success_until.is_some_and(|until| Instant::now() < until)
    }
}
