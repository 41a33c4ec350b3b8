use std::cell::RefCell;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error};

use crate::cache::{CacheLookup, CachePolicy, CacheSnapshot, PrefsCache};
use crate::db::Database;
use crate::error::PrefsError;
use crate::mapping;
use crate::models::{
    EXPORT_VERSION, NewStylePrefs, PrefsExport, PrefsForm, PrefsPatch, StylePrefs, validate_form,
    validate_new_record, validate_patch, validate_record,
};
use crate::retry::{self, BackoffPolicy};
use crate::telemetry::{self, FEATURE, LogSink, TelemetryEvent, TelemetrySink};

/// Backend persistence boundary. Exactly three operation shapes:
/// select-by-key with an optional row, full upsert, and partial upsert.
///
/// The bundled [`Database`] implements this against local SQLite; remote
/// backends implement it with whatever transport they have. The whole
/// pipeline is driven from one thread, so implementations need no thread
/// bounds.
pub trait PrefsStore {
    fn fetch(&self, user_id: &str) -> Result<Option<StylePrefs>, PrefsError>;
    fn upsert(&self, row: &NewStylePrefs) -> Result<StylePrefs, PrefsError>;
    fn upsert_patch(&self, user_id: &str, patch: &PrefsPatch) -> Result<StylePrefs, PrefsError>;
}

impl PrefsStore for Database {
    fn fetch(&self, user_id: &str) -> Result<Option<StylePrefs>, PrefsError> {
        self.get_prefs(user_id)
            .map_err(|e| PrefsError::Backend(e.to_string()))
    }

    fn upsert(&self, row: &NewStylePrefs) -> Result<StylePrefs, PrefsError> {
        self.upsert_prefs(row)
            .map_err(|e| PrefsError::Backend(e.to_string()))
    }

    fn upsert_patch(&self, user_id: &str, patch: &PrefsPatch) -> Result<StylePrefs, PrefsError> {
        self.apply_patch(user_id, patch)
            .map_err(|e| PrefsError::Backend(e.to_string()))
    }
}

/// Outcome of a fetch. `Disabled` means no authenticated identity was
/// available, so no request was made: an empty, non-loading state.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState {
    Disabled,
    Loaded(Option<StylePrefs>),
}

/// One save request. When `previous_form` is present only the delta is
/// persisted; otherwise a complete row is written.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub user_id: String,
    pub new_form: PrefsForm,
    pub previous_form: Option<PrefsForm>,
}

pub struct PrefsService {
    store: Box<dyn PrefsStore>,
    cache: RefCell<PrefsCache>,
    telemetry: Box<dyn TelemetrySink>,
    backoff: BackoffPolicy,
}

impl PrefsService {
    pub fn new(store: Box<dyn PrefsStore>) -> Self {
        Self::with_parts(
            store,
            CachePolicy::default(),
            Box::new(LogSink),
            BackoffPolicy::default(),
        )
    }

    pub fn with_parts(
        store: Box<dyn PrefsStore>,
        cache_policy: CachePolicy,
        telemetry: Box<dyn TelemetrySink>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            cache: RefCell::new(PrefsCache::new(cache_policy)),
            telemetry,
            backoff,
        }
    }

    /// Fetch the current user's record, read-through cached.
    ///
    /// The raw store response is validated before anything trusts its shape;
    /// a malformed row surfaces as a schema error, never as silent data
    /// loss.
    pub fn get_prefs(&self, user_id: Option<&str>) -> Result<FetchState, PrefsError> {
        let Some(user_id) = user_id else {
            debug!("no authenticated identity, fetch disabled");
            return Ok(FetchState::Disabled);
        };

        if let CacheLookup::Fresh(value) = self.cache.borrow_mut().lookup(user_id) {
            return Ok(FetchState::Loaded(value));
        }

        let started = Instant::now();
        let fetched = match self.store.fetch(user_id) {
            Ok(value) => value,
            Err(err) => return Err(self.observe_failure("fetch", err, Vec::new(), started)),
        };
        if let Some(ref record) = fetched {
            if let Err(err) = validate_record(record) {
                return Err(self.observe_failure("fetch", err, Vec::new(), started));
            }
        }
        self.cache.borrow_mut().put(user_id, fetched.clone());
        Ok(FetchState::Loaded(fetched))
    }

    /// Persist a preference change with retry, response validation, cache
    /// invalidation, and telemetry.
    ///
    /// Validation failures abort before any store call and are permanent;
    /// transient store failures are retried per the backoff policy.
    pub fn save_prefs(&self, req: &SaveRequest) -> Result<StylePrefs, PrefsError> {
        let started = Instant::now();

        if let Err(err) = validate_form(&req.new_form) {
            return Err(self.observe_failure("save", err, Vec::new(), started));
        }

        let (metadata, result) = if let Some(previous) = &req.previous_form {
            let patch = mapping::changed_fields(&req.new_form, previous);
            let metadata = telemetry::patch_metadata(&patch);
            if let Err(err) = validate_patch(&patch) {
                return Err(self.observe_failure("save", err, metadata, started));
            }
            let result = retry::run(&self.backoff, |attempt| {
                debug!(attempt, "persisting preferences patch");
                self.store.upsert_patch(&req.user_id, &patch)
            });
            (metadata, result)
        } else {
            let row = mapping::to_row(&req.new_form, &req.user_id);
            let metadata = telemetry::row_metadata(&row);
            if let Err(err) = validate_new_record(&row) {
                return Err(self.observe_failure("save", err, metadata, started));
            }
            let result = retry::run(&self.backoff, |attempt| {
                debug!(attempt, "persisting full preferences row");
                self.store.upsert(&row)
            });
            (metadata, result)
        };

        match result {
            Ok(saved) => {
                // A response that fails validation is a permanent failure,
                // distinct from the transient classes.
                if let Err(err) = validate_record(&saved) {
                    return Err(self.observe_failure("save", err, metadata, started));
                }
                self.cache.borrow_mut().invalidate(&req.user_id);
                self.observe_success("save", metadata, started);
                Ok(saved)
            }
            Err(err) => Err(self.observe_failure("save", err, metadata, started)),
        }
    }

    // --- Cache hooks for optimistic orchestration ---

    #[must_use]
    pub fn cache_snapshot(&self, user_id: &str) -> CacheSnapshot {
        self.cache.borrow().snapshot(user_id)
    }

    pub fn restore_cache(&self, snapshot: CacheSnapshot) {
        self.cache.borrow_mut().restore(snapshot);
    }

    /// Speculatively install the would-be saved record for `user_id` so
    /// readers see the change before the backend confirms it.
    pub fn cache_optimistic(&self, user_id: &str, form: &PrefsForm) {
        let row = mapping::to_row(form, user_id);
        let now = Utc::now().to_rfc3339();
        let record = StylePrefs {
            user_id: row.user_id,
            no_repeat_days: row.no_repeat_days,
            no_repeat_mode: row.no_repeat_mode,
            colour_preferences: row.colour_preferences,
            exclusions: row.exclusions,
            comfort_notes: row.comfort_notes,
            created_at: now.clone(),
            updated_at: now,
        };
        self.cache.borrow_mut().put(user_id, Some(record));
    }

    // --- Export / import ---

    pub fn export_prefs(&self, user_id: &str) -> Result<PrefsExport, PrefsError> {
        let prefs = self.store.fetch(user_id)?;
        if let Some(ref record) = prefs {
            validate_record(record)?;
        }
        Ok(PrefsExport {
            version: EXPORT_VERSION,
            exported_at: Utc::now().to_rfc3339(),
            prefs,
        })
    }

    /// Import a previously exported record. The record is validated before
    /// it touches the store.
    pub fn import_prefs(&self, data: &PrefsExport) -> Result<Option<StylePrefs>, PrefsError> {
        let Some(ref record) = data.prefs else {
            return Ok(None);
        };
        validate_record(record)?;
        let row = NewStylePrefs {
            user_id: record.user_id.clone(),
            no_repeat_days: record.no_repeat_days,
            no_repeat_mode: record.no_repeat_mode.clone(),
            colour_preferences: record.colour_preferences.clone(),
            exclusions: record.exclusions.clone(),
            comfort_notes: record.comfort_notes.clone(),
        };
        let saved = self.store.upsert(&row)?;
        self.cache.borrow_mut().invalidate(&record.user_id);
        Ok(Some(saved))
    }

    // --- Observation helpers ---

    fn elapsed_ms(started: Instant) -> u64 {
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn observe_success(
        &self,
        operation: &'static str,
        metadata: Vec<(&'static str, bool)>,
        started: Instant,
    ) {
        self.telemetry.emit(TelemetryEvent {
            feature: FEATURE,
            operation,
            outcome: "success",
            elapsed_ms: Self::elapsed_ms(started),
            metadata,
        });
    }

    fn observe_failure(
        &self,
        operation: &'static str,
        err: PrefsError,
        metadata: Vec<(&'static str, bool)>,
        started: Instant,
    ) -> PrefsError {
        error!(operation, kind = err.kind(), error = %err, "preferences operation failed");
        self.telemetry.emit(TelemetryEvent {
            feature: FEATURE,
            operation,
            outcome: err.kind(),
            elapsed_ms: Self::elapsed_ms(started),
            metadata,
        });
        err
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::models::NoRepeatMode;

    #[derive(Default)]
    struct MockInner {
        records: HashMap<String, StylePrefs>,
        fail_upserts: u32,
        fetch_calls: u32,
        upsert_calls: u32,
        patch_calls: u32,
        corrupt_responses: bool,
    }

    #[derive(Default)]
    struct MockStore {
        inner: Mutex<MockInner>,
    }

    impl MockStore {
        fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing(times: u32) -> Arc<Self> {
            let store = Self::shared();
            store.inner.lock().unwrap().fail_upserts = times;
            store
        }

        fn record_from_row(row: &NewStylePrefs, corrupt: bool) -> StylePrefs {
            StylePrefs {
                user_id: row.user_id.clone(),
                no_repeat_days: row.no_repeat_days,
                no_repeat_mode: if corrupt {
                    "garbage".to_string()
                } else {
                    row.no_repeat_mode.clone()
                },
                colour_preferences: row.colour_preferences.clone(),
                exclusions: row.exclusions.clone(),
                comfort_notes: row.comfort_notes.clone(),
                created_at: "2024-06-15T10:00:00Z".to_string(),
                updated_at: "2024-06-15T10:00:00Z".to_string(),
            }
        }
    }

    impl PrefsStore for Arc<MockStore> {
        fn fetch(&self, user_id: &str) -> Result<Option<StylePrefs>, PrefsError> {
            let mut inner = self.inner.lock().unwrap();
            inner.fetch_calls += 1;
            Ok(inner.records.get(user_id).cloned())
        }

        fn upsert(&self, row: &NewStylePrefs) -> Result<StylePrefs, PrefsError> {
            let mut inner = self.inner.lock().unwrap();
            inner.upsert_calls += 1;
            if inner.fail_upserts > 0 {
                inner.fail_upserts -= 1;
                return Err(PrefsError::Network("connection reset".to_string()));
            }
            let record = MockStore::record_from_row(row, inner.corrupt_responses);
            inner.records.insert(row.user_id.clone(), record.clone());
            Ok(record)
        }

        fn upsert_patch(
            &self,
            user_id: &str,
            patch: &PrefsPatch,
        ) -> Result<StylePrefs, PrefsError> {
            let mut inner = self.inner.lock().unwrap();
            inner.patch_calls += 1;
            if inner.fail_upserts > 0 {
                inner.fail_upserts -= 1;
                return Err(PrefsError::Network("connection reset".to_string()));
            }
            let mut merged = match inner.records.get(user_id) {
                Some(existing) => NewStylePrefs {
                    user_id: existing.user_id.clone(),
                    no_repeat_days: existing.no_repeat_days,
                    no_repeat_mode: existing.no_repeat_mode.clone(),
                    colour_preferences: existing.colour_preferences.clone(),
                    exclusions: existing.exclusions.clone(),
                    comfort_notes: existing.comfort_notes.clone(),
                },
                None => NewStylePrefs::empty(user_id),
            };
            if let Some(days) = patch.no_repeat_days {
                merged.no_repeat_days = Some(days);
            }
            if let Some(ref mode) = patch.no_repeat_mode {
                merged.no_repeat_mode = mode.clone();
            }
            if let Some(ref colours) = patch.colour_preferences {
                merged.colour_preferences = colours.clone();
            }
            if let Some(ref exclusions) = patch.exclusions {
                merged.exclusions = exclusions.clone();
            }
            if let Some(ref notes) = patch.comfort_notes {
                merged.comfort_notes = notes.clone();
            }
            let record = MockStore::record_from_row(&merged, inner.corrupt_responses);
            inner.records.insert(user_id.to_string(), record.clone());
            Ok(record)
        }
    }

    #[derive(Default)]
    struct CaptureSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetrySink for Arc<CaptureSink> {
        fn emit(&self, event: TelemetryEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ms: 1,
        }
    }

    fn service_with(store: &Arc<MockStore>) -> (PrefsService, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::default());
        let service = PrefsService::with_parts(
            Box::new(Arc::clone(store)),
            CachePolicy::default(),
            Box::new(Arc::clone(&sink)),
            fast_backoff(),
        );
        (service, sink)
    }

    #[test]
    fn test_fetch_disabled_without_identity() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);
        assert_eq!(service.get_prefs(None).unwrap(), FetchState::Disabled);
        assert_eq!(store.inner.lock().unwrap().fetch_calls, 0);
    }

    #[test]
    fn test_fetch_missing_row_is_loaded_none() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);
        assert_eq!(
            service.get_prefs(Some("user-1")).unwrap(),
            FetchState::Loaded(None)
        );
    }

    #[test]
    fn test_fetch_served_from_cache_while_fresh() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);

        service.get_prefs(Some("user-1")).unwrap();
        service.get_prefs(Some("user-1")).unwrap();

        assert_eq!(store.inner.lock().unwrap().fetch_calls, 1);
    }

    #[test]
    fn test_fetch_rejects_malformed_record() {
        let store = MockStore::shared();
        store.inner.lock().unwrap().records.insert(
            "user-1".to_string(),
            StylePrefs {
                user_id: "user-1".to_string(),
                no_repeat_days: Some(999),
                no_repeat_mode: "item".to_string(),
                colour_preferences: Vec::new(),
                exclusions: Vec::new(),
                comfort_notes: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
        );
        let (service, sink) = service_with(&store);

        let err = service.get_prefs(Some("user-1")).unwrap_err();
        assert_eq!(err.kind(), "schema");
        let events = sink.events.lock().unwrap();
        assert_eq!(events.last().unwrap().outcome, "schema");
    }

    #[test]
    fn test_save_full_row_then_read_back() {
        let store = MockStore::shared();
        let (service, sink) = service_with(&store);
        let form = PrefsForm {
            colour_tendency: "neutrals".to_string(),
            comfort_notes: "warm layers".to_string(),
            ..PrefsForm::default()
        };

        let saved = service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: form,
                previous_form: None,
            })
            .unwrap();
        assert_eq!(saved.colour_preferences, vec!["neutrals".to_string()]);

        match service.get_prefs(Some("user-1")).unwrap() {
            FetchState::Loaded(Some(record)) => {
                assert_eq!(record.comfort_notes.as_deref(), Some("warm layers"));
            }
            other => panic!("expected loaded record, got {other:?}"),
        }

        let events = sink.events.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| e.operation == "save" && e.outcome == "success")
        );
    }

    #[test]
    fn test_save_with_previous_form_sends_delta() {
        let store = MockStore::shared();
        let (service, sink) = service_with(&store);

        let previous = PrefsForm::default();
        let mut next = previous.clone();
        next.no_repeat_days = 21;

        service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: next,
                previous_form: Some(previous),
            })
            .unwrap();

        {
            let inner = store.inner.lock().unwrap();
            assert_eq!(inner.patch_calls, 1);
            assert_eq!(inner.upsert_calls, 0);
        }

        let events = sink.events.lock().unwrap();
        let success = events
            .iter()
            .find(|e| e.outcome == "success")
            .expect("success event");
        assert!(success.metadata.contains(&("sets_days", true)));
        assert!(success.metadata.contains(&("sets_notes", false)));
    }

    #[test]
    fn test_save_invalid_form_makes_no_store_call() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);

        let form = PrefsForm {
            no_repeat_days: 91,
            ..PrefsForm::default()
        };
        let err = service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: form,
                previous_form: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        assert_eq!(store.inner.lock().unwrap().upsert_calls, 0);
    }

    #[test]
    fn test_save_retries_transient_failures_then_succeeds() {
        let store = MockStore::failing(2);
        let (service, _) = service_with(&store);

        let result = service.save_prefs(&SaveRequest {
            user_id: "user-1".to_string(),
            new_form: PrefsForm::default(),
            previous_form: None,
        });
        assert!(result.is_ok());

        assert_eq!(store.inner.lock().unwrap().upsert_calls, 3);
    }

    #[test]
    fn test_save_gives_up_after_max_attempts() {
        let store = MockStore::failing(10);
        let (service, _) = service_with(&store);

        let err = service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: PrefsForm::default(),
                previous_form: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "network");

        assert_eq!(store.inner.lock().unwrap().upsert_calls, 3);
    }

    #[test]
    fn test_save_rejects_corrupt_response() {
        let store = MockStore::shared();
        store.inner.lock().unwrap().corrupt_responses = true;
        let (service, _) = service_with(&store);

        let err = service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: PrefsForm::default(),
                previous_form: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn test_save_invalidates_cache() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);

        // Prime the cache, then save, then read again: the second read must
        // go back to the store.
        service.get_prefs(Some("user-1")).unwrap();
        service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: PrefsForm {
                    no_repeat_mode: NoRepeatMode::Outfit,
                    ..PrefsForm::default()
                },
                previous_form: None,
            })
            .unwrap();
        service.get_prefs(Some("user-1")).unwrap();

        assert_eq!(store.inner.lock().unwrap().fetch_calls, 2);
    }

    #[test]
    fn test_privacy_no_free_text_in_any_event() {
        let store = MockStore::shared();
        let (service, sink) = service_with(&store);
        let form = PrefsForm {
            comfort_notes: "sensitive info".to_string(),
            free_text: "sensitive info".to_string(),
            ..PrefsForm::default()
        };

        service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: form,
                previous_form: Some(PrefsForm::default()),
            })
            .unwrap();

        let events = sink.events.lock().unwrap();
        assert!(!events.is_empty());
        for event in events.iter() {
            let summary = event.metadata_summary();
            assert!(!summary.contains("sensitive info"), "leaked: {summary}");
        }
    }

    #[test]
    fn test_export_import_round_trip() {
        let source_store = MockStore::shared();
        let (source, _) = service_with(&source_store);
        let form = PrefsForm {
            colour_tendency: "pastels".to_string(),
            checklist: vec!["heels".to_string()],
            ..PrefsForm::default()
        };
        source
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: form,
                previous_form: None,
            })
            .unwrap();

        let export = source.export_prefs("user-1").unwrap();
        assert_eq!(export.version, EXPORT_VERSION);

        let target_store = MockStore::shared();
        let (target, _) = service_with(&target_store);
        let imported = target.import_prefs(&export).unwrap().unwrap();
        assert_eq!(imported.colour_preferences, vec!["pastels".to_string()]);
        assert_eq!(imported.exclusions, vec!["heels".to_string()]);
    }

    #[test]
    fn test_import_rejects_invalid_record() {
        let store = MockStore::shared();
        let (service, _) = service_with(&store);
        let export = PrefsExport {
            version: EXPORT_VERSION,
            exported_at: "2024-06-15T10:00:00Z".to_string(),
            prefs: Some(StylePrefs {
                user_id: String::new(),
                no_repeat_days: None,
                no_repeat_mode: "item".to_string(),
                colour_preferences: Vec::new(),
                exclusions: Vec::new(),
                comfort_notes: None,
                created_at: String::new(),
                updated_at: String::new(),
            }),
        };
        assert!(service.import_prefs(&export).is_err());
        assert_eq!(store.inner.lock().unwrap().upsert_calls, 0);
    }

    #[test]
    fn test_service_over_real_database() {
        let db = Database::open_in_memory().unwrap();
        let service = PrefsService::with_parts(
            Box::new(db),
            CachePolicy::default(),
            Box::new(crate::telemetry::NoopSink),
            fast_backoff(),
        );

        let form = PrefsForm {
            checklist: vec!["skirts".to_string()],
            free_text: "no wool".to_string(),
            ..PrefsForm::default()
        };
        let saved = service
            .save_prefs(&SaveRequest {
                user_id: "user-1".to_string(),
                new_form: form,
                previous_form: None,
            })
            .unwrap();
        assert_eq!(
            saved.exclusions,
            vec!["skirts".to_string(), "free:no wool".to_string()]
        );

        match service.get_prefs(Some("user-1")).unwrap() {
            FetchState::Loaded(Some(record)) => {
                assert_eq!(record.exclusions.len(), 2);
            }
            other => panic!("expected loaded record, got {other:?}"),
        }
    }
}
