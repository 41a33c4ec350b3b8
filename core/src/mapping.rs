//! Bidirectional mapping between the persisted record shape and the UI form
//! model, plus delta computation for partial updates.
//!
//! Every function here is pure and total: malformed or unknown stored values
//! degrade to UI defaults instead of propagating errors.

use std::collections::HashSet;

use tracing::debug;

use crate::models::{
    COLOUR_TAGS, DEFAULT_NO_REPEAT_DAYS, Exclusion, NewStylePrefs, NoRepeatMode, PrefsForm,
    PrefsPatch, StylePrefs, UNDECIDED, clamp_no_repeat_days,
};

/// Build the UI form from the persisted record. `None` (no row yet) yields
/// the all-defaults form.
#[must_use]
pub fn to_form(record: Option<&StylePrefs>) -> PrefsForm {
    let Some(record) = record else {
        return PrefsForm::default();
    };

    // First recognized colour tag wins; anything else is "undecided".
    let colour_tendency = record
        .colour_preferences
        .iter()
        .find(|tag| COLOUR_TAGS.contains(&tag.as_str()))
        .cloned()
        .unwrap_or_else(|| UNDECIDED.to_string());

    let mut checklist = Vec::new();
    let mut free_lines = Vec::new();
    for raw in &record.exclusions {
        match Exclusion::parse(raw) {
            Some(Exclusion::Canonical(tag)) => checklist.push(tag),
            Some(Exclusion::FreeText(text)) => free_lines.push(text),
            // Forward-compatibility: entries this client version doesn't
            // recognize are dropped on read.
            None => debug!("dropping unrecognized exclusion entry"),
        }
    }

    PrefsForm {
        colour_tendency,
        checklist,
        free_text: free_lines.join("\n"),
        no_repeat_days: clamp_no_repeat_days(
            record.no_repeat_days.unwrap_or(DEFAULT_NO_REPEAT_DAYS),
        ),
        no_repeat_mode: NoRepeatMode::parse(&record.no_repeat_mode).unwrap_or_default(),
        comfort_notes: record
            .comfort_notes
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string(),
    }
}

/// Build a complete row for insert/upsert from the UI form.
#[must_use]
pub fn to_row(form: &PrefsForm, user_id: &str) -> NewStylePrefs {
    NewStylePrefs {
        user_id: user_id.to_string(),
        no_repeat_days: Some(form.no_repeat_days),
        no_repeat_mode: form.no_repeat_mode.as_str().to_string(),
        colour_preferences: colour_list(&form.colour_tendency),
        exclusions: encode_exclusions(&form.checklist, &form.free_text),
        comfort_notes: normalize_notes(&form.comfort_notes),
    }
}

/// Full-form update payload: same transforms as [`to_row`], no identifier or
/// timestamp fields.
#[must_use]
pub fn to_patch(form: &PrefsForm) -> PrefsPatch {
    PrefsPatch {
        no_repeat_days: Some(form.no_repeat_days),
        no_repeat_mode: Some(form.no_repeat_mode.as_str().to_string()),
        colour_preferences: Some(colour_list(&form.colour_tendency)),
        exclusions: Some(encode_exclusions(&form.checklist, &form.free_text)),
        comfort_notes: Some(normalize_notes(&form.comfort_notes)),
    }
}

/// True iff at least one field differs from the all-defaults form.
#[must_use]
pub fn has_any_data(form: &PrefsForm) -> bool {
    form.colour_tendency != UNDECIDED
        || !form.checklist.is_empty()
        || !form.free_text.trim().is_empty()
        || form.no_repeat_days != DEFAULT_NO_REPEAT_DAYS
        || form.no_repeat_mode != NoRepeatMode::default()
        || !form.comfort_notes.trim().is_empty()
}

/// Field-by-field delta between two forms, transformed through the
/// save-direction rules. The checklist is compared as a set and free text
/// after trimming; only changed fields appear in the result.
#[must_use]
pub fn changed_fields(current: &PrefsForm, previous: &PrefsForm) -> PrefsPatch {
    let mut patch = PrefsPatch::default();

    if current.no_repeat_days != previous.no_repeat_days {
        patch.no_repeat_days = Some(current.no_repeat_days);
    }
    if current.no_repeat_mode != previous.no_repeat_mode {
        patch.no_repeat_mode = Some(current.no_repeat_mode.as_str().to_string());
    }
    if current.colour_tendency != previous.colour_tendency {
        patch.colour_preferences = Some(colour_list(&current.colour_tendency));
    }
    if !same_set(&current.checklist, &previous.checklist)
        || current.free_text.trim() != previous.free_text.trim()
    {
        patch.exclusions = Some(encode_exclusions(&current.checklist, &current.free_text));
    }
    if current.comfort_notes.trim() != previous.comfort_notes.trim() {
        patch.comfort_notes = Some(normalize_notes(&current.comfort_notes));
    }

    patch
}

fn colour_list(tendency: &str) -> Vec<String> {
    if tendency == UNDECIDED {
        Vec::new()
    } else {
        vec![tendency.to_string()]
    }
}

fn encode_exclusions(checklist: &[String], free_text: &str) -> Vec<String> {
    let mut out: Vec<String> = checklist
        .iter()
        .map(|tag| Exclusion::Canonical(tag.clone()).encode())
        .collect();
    for line in free_text.lines() {
        if let Some(entry) = Exclusion::free_text(line) {
            out.push(entry.encode());
        }
    }
    out
}

fn normalize_notes(notes: &str) -> Option<String> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
