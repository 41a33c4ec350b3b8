use serde::{Deserialize, Serialize};

use crate::error::{FieldViolations, PrefsError};

/// Canonical colour-tendency tags recognized by this client.
pub const COLOUR_TAGS: &[&str] = &["neutrals", "brights", "pastels", "earth_tones", "monochrome"];

/// UI-only sentinel for "no colour tendency chosen yet". Never stored.
pub const UNDECIDED: &str = "undecided";

/// Canonical exclusion tags recognized by this client.
pub const EXCLUSION_TAGS: &[&str] = &[
    "skirts",
    "dresses",
    "heels",
    "sleeveless",
    "shorts",
    "crop_tops",
];

/// Reserved marker distinguishing free-text exclusion entries from tags.
pub const FREE_TEXT_PREFIX: &str = "free:";

pub const DEFAULT_NO_REPEAT_DAYS: i64 = 7;
/// Upper bound for user entry. Storage tolerates a wider range.
pub const UI_MAX_NO_REPEAT_DAYS: i64 = 90;
pub const STORAGE_MAX_NO_REPEAT_DAYS: i64 = 180;
pub const MAX_COMFORT_NOTES_LEN: usize = 500;

/// Format version written into [`PrefsExport`] files.
pub const EXPORT_VERSION: i64 = 1;

/// What "don't repeat within N days" applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoRepeatMode {
    #[default]
    Item,
    Outfit,
}

impl NoRepeatMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Outfit => "outfit",
        }
    }

    /// Lenient parse; callers substitute the default on `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "item" => Some(Self::Item),
            "outfit" => Some(Self::Outfit),
            _ => None,
        }
    }
}

impl std::fmt::Display for NoRepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored exclusion entry, classified by construction.
///
/// `FreeText` always holds the bare user text (marker stripped), so encoding
/// can never double-prefix and readers never sniff prefixes inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    Canonical(String),
    FreeText(String),
}

impl Exclusion {
    /// Classify a raw stored entry. Unknown non-prefixed tags and blank
    /// free-text entries yield `None` and are dropped by readers
    /// (forward-compatibility policy).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(rest) = raw.strip_prefix(FREE_TEXT_PREFIX) {
            let text = rest.trim();
            if text.is_empty() {
                None
            } else {
                Some(Self::FreeText(text.to_string()))
            }
        } else if EXCLUSION_TAGS.contains(&raw) {
            Some(Self::Canonical(raw.to_string()))
        } else {
            None
        }
    }

    /// Build a free-text entry from one line of UI input. A line already
    /// carrying the marker is normalized rather than double-prefixed.
    #[must_use]
    pub fn free_text(line: &str) -> Option<Self> {
        let text = line.strip_prefix(FREE_TEXT_PREFIX).unwrap_or(line).trim();
        if text.is_empty() {
            None
        } else {
            Some(Self::FreeText(text.to_string()))
        }
    }

    /// Storage form of the entry.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Canonical(tag) => tag.clone(),
            Self::FreeText(text) => format!("{FREE_TEXT_PREFIX}{text}"),
        }
    }
}

/// Persisted preferences record, one row per user.
///
/// Field shapes mirror storage: the mode is the raw stored string and the
/// array fields keep raw entries, so unknown values survive until the
/// mapping layer degrades them gracefully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylePrefs {
    pub user_id: String,
    pub no_repeat_days: Option<i64>,
    pub no_repeat_mode: String,
    pub colour_preferences: Vec<String>,
    pub exclusions: Vec<String>,
    pub comfort_notes: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Insert/upsert shape: all mutable fields plus the key, no timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStylePrefs {
    pub user_id: String,
    pub no_repeat_days: Option<i64>,
    pub no_repeat_mode: String,
    pub colour_preferences: Vec<String>,
    pub exclusions: Vec<String>,
    pub comfort_notes: Option<String>,
}

impl NewStylePrefs {
    /// All-defaults row for a user that has never saved.
    #[must_use]
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            no_repeat_days: None,
            no_repeat_mode: NoRepeatMode::default().as_str().to_string(),
            colour_preferences: Vec::new(),
            exclusions: Vec::new(),
            comfort_notes: None,
        }
    }
}

/// Partial projection of the mutable record fields.
///
/// `comfort_notes` is doubly optional so "clear the notes" is representable
/// distinctly from "leave the notes alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefsPatch {
    pub no_repeat_days: Option<i64>,
    pub no_repeat_mode: Option<String>,
    pub colour_preferences: Option<Vec<String>>,
    pub exclusions: Option<Vec<String>>,
    pub comfort_notes: Option<Option<String>>,
}

impl PrefsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.no_repeat_days.is_none()
            && self.no_repeat_mode.is_none()
            && self.colour_preferences.is_none()
            && self.exclusions.is_none()
            && self.comfort_notes.is_none()
    }
}

/// UI form model. Never persisted as-is; no field is ever null here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefsForm {
    pub colour_tendency: String,
    pub checklist: Vec<String>,
    pub free_text: String,
    pub no_repeat_days: i64,
    pub no_repeat_mode: NoRepeatMode,
    pub comfort_notes: String,
}

impl Default for PrefsForm {
    fn default() -> Self {
        Self {
            colour_tendency: UNDECIDED.to_string(),
            checklist: Vec::new(),
            free_text: String::new(),
            no_repeat_days: DEFAULT_NO_REPEAT_DAYS,
            no_repeat_mode: NoRepeatMode::default(),
            comfort_notes: String::new(),
        }
    }
}

/// On-disk export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefsExport {
    pub version: i64,
    pub exported_at: String,
    pub prefs: Option<StylePrefs>,
}

// --- Schema validators ---

fn check_days(v: &mut FieldViolations, days: Option<i64>, max: i64) {
    if let Some(days) = days {
        if !(0..=max).contains(&days) {
            v.push("no_repeat_days", format!("must be between 0 and {max}"));
        }
    }
}

fn check_mode(v: &mut FieldViolations, mode: &str) {
    if NoRepeatMode::parse(mode).is_none() {
        v.push("no_repeat_mode", "must be 'item' or 'outfit'");
    }
}

fn check_notes(v: &mut FieldViolations, notes: Option<&str>) {
    if notes.is_some_and(|n| n.chars().count() > MAX_COMFORT_NOTES_LEN) {
        v.push(
            "comfort_notes",
            format!("must be at most {MAX_COMFORT_NOTES_LEN} characters"),
        );
    }
}

/// Validate a persisted record (or a backend response claiming to be one).
///
/// Array fields only need to be arrays of strings; unknown tags pass here
/// and are degraded later by the mapping layer.
pub fn validate_record(record: &StylePrefs) -> Result<(), PrefsError> {
    let mut v = FieldViolations::new();
    if record.user_id.trim().is_empty() {
        v.push("user_id", "must not be empty");
    }
    check_days(&mut v, record.no_repeat_days, STORAGE_MAX_NO_REPEAT_DAYS);
    check_mode(&mut v, &record.no_repeat_mode);
    check_notes(&mut v, record.comfort_notes.as_deref());
    if v.is_empty() { Ok(()) } else { Err(PrefsError::Schema(v)) }
}

/// Validate a complete row about to be persisted. Same rules as
/// [`validate_record`] minus the server-managed timestamps.
pub fn validate_new_record(row: &NewStylePrefs) -> Result<(), PrefsError> {
    let mut v = FieldViolations::new();
    if row.user_id.trim().is_empty() {
        v.push("user_id", "must not be empty");
    }
    check_days(&mut v, row.no_repeat_days, STORAGE_MAX_NO_REPEAT_DAYS);
    check_mode(&mut v, &row.no_repeat_mode);
    check_notes(&mut v, row.comfort_notes.as_deref());
    if v.is_empty() { Ok(()) } else { Err(PrefsError::Schema(v)) }
}

/// Validate an outgoing partial update. All fields optional, record rules
/// per field.
pub fn validate_patch(patch: &PrefsPatch) -> Result<(), PrefsError> {
    let mut v = FieldViolations::new();
    check_days(&mut v, patch.no_repeat_days, STORAGE_MAX_NO_REPEAT_DAYS);
    if let Some(ref mode) = patch.no_repeat_mode {
        check_mode(&mut v, mode);
    }
    if let Some(Some(ref notes)) = patch.comfort_notes {
        check_notes(&mut v, Some(notes));
    }
    if v.is_empty() { Ok(()) } else { Err(PrefsError::Schema(v)) }
}

/// Validate the UI form. Unlike the record validators this rejects unknown
/// checklist tags: the form is client-authored, so anything unrecognized is
/// user error rather than forward-compatibility.
pub fn validate_form(form: &PrefsForm) -> Result<(), PrefsError> {
    let mut v = FieldViolations::new();
    if form.colour_tendency != UNDECIDED && !COLOUR_TAGS.contains(&form.colour_tendency.as_str()) {
        v.push("colour_tendency", "unknown tag");
    }
    if form
        .checklist
        .iter()
        .any(|t| !EXCLUSION_TAGS.contains(&t.as_str()))
    {
        v.push("checklist", "entries must be canonical exclusion tags");
    }
    check_days(&mut v, Some(form.no_repeat_days), UI_MAX_NO_REPEAT_DAYS);
    check_notes(&mut v, Some(&form.comfort_notes));
    if v.is_empty() {
        Ok(())
    } else {
        Err(PrefsError::Validation(v))
    }
}

// --- Standalone field helpers ---

/// Primary validator for the no-repeat-days input field (UI range).
pub fn validate_no_repeat_days(days: i64) -> Result<i64, String> {
    if (0..=UI_MAX_NO_REPEAT_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(format!("Days must be between 0 and {UI_MAX_NO_REPEAT_DAYS}"))
    }
}

/// Defensive normalization only — always returns an in-range value and never
/// signals an error. Not a substitute for [`validate_no_repeat_days`].
#[must_use]
pub fn clamp_no_repeat_days(days: i64) -> i64 {
    days.clamp(0, UI_MAX_NO_REPEAT_DAYS)
}
