use anyhow::{Result, bail};

use attire_core::models::{COLOUR_TAGS, EXCLUSION_TAGS, NoRepeatMode, UNDECIDED};
use attire_core::service::PrefsService;

use super::{load_controller, save_and_report};

pub(crate) fn cmd_days(
    service: PrefsService,
    user_id: &str,
    days: i64,
    json: bool,
) -> Result<()> {
    let mut controller = load_controller(service, user_id)?;
    controller.set_no_repeat_days(days);
    if let Some(message) = controller.days_error() {
        bail!("{message}");
    }
    let mode = controller.form().no_repeat_mode;
    save_and_report(
        &mut controller,
        json,
        &format!("No-repeat window set to {days} days (per {mode})"),
    )
}

pub(crate) fn cmd_mode(service: PrefsService, user_id: &str, mode: &str, json: bool) -> Result<()> {
    let Some(mode) = NoRepeatMode::parse(mode) else {
        bail!("Invalid mode '{mode}'. Use 'item' or 'outfit'");
    };
    let mut controller = load_controller(service, user_id)?;
    controller.set_no_repeat_mode(mode);
    save_and_report(
        &mut controller,
        json,
        &format!("No-repeat mode set to '{mode}'"),
    )
}

pub(crate) fn cmd_colour(service: PrefsService, user_id: &str, tag: &str, json: bool) -> Result<()> {
    if tag != UNDECIDED && !COLOUR_TAGS.contains(&tag) {
        bail!(
            "Unknown colour tendency '{tag}'. Use one of: {}, or '{UNDECIDED}' to clear",
            COLOUR_TAGS.join(", ")
        );
    }
    let mut controller = load_controller(service, user_id)?;
    controller.set_colour_tendency(tag);
    let message = if tag == UNDECIDED {
        "Colour tendency cleared".to_string()
    } else {
        format!("Colour tendency set to '{tag}'")
    };
    save_and_report(&mut controller, json, &message)
}

pub(crate) fn cmd_exclude_add(
    service: PrefsService,
    user_id: &str,
    tag: &str,
    json: bool,
) -> Result<()> {
    if !EXCLUSION_TAGS.contains(&tag) {
        bail!(
            "Unknown exclusion tag '{tag}'. Use one of: {}. For anything else, use `attire exclude free`",
            EXCLUSION_TAGS.join(", ")
        );
    }
    let mut controller = load_controller(service, user_id)?;
    if controller.form().checklist.iter().any(|t| t == tag) {
        bail!("'{tag}' is already excluded");
    }
    controller.toggle_checklist(tag);
    save_and_report(&mut controller, json, &format!("Excluded '{tag}'"))
}

pub(crate) fn cmd_exclude_remove(
    service: PrefsService,
    user_id: &str,
    entry: &str,
    json: bool,
) -> Result<()> {
    let mut controller = load_controller(service, user_id)?;

    if controller.form().checklist.iter().any(|t| t == entry) {
        controller.toggle_checklist(entry);
        return save_and_report(&mut controller, json, &format!("Removed exclusion '{entry}'"));
    }

    let remaining: Vec<&str> = controller
        .form()
        .free_text
        .lines()
        .filter(|line| line.trim() != entry.trim())
        .collect();
    if remaining.len() == controller.form().free_text.lines().count() {
        bail!("No exclusion matching '{entry}'");
    }
    let free_text = remaining.join("\n");
    controller.set_free_text(&free_text);
    save_and_report(&mut controller, json, &format!("Removed exclusion '{entry}'"))
}

pub(crate) fn cmd_exclude_free(
    service: PrefsService,
    user_id: &str,
    text: &str,
    json: bool,
) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        bail!("Free-text exclusion must not be empty");
    }
    let mut controller = load_controller(service, user_id)?;
    let free_text = if controller.form().free_text.is_empty() {
        text.to_string()
    } else {
        format!("{}\n{text}", controller.form().free_text)
    };
    controller.set_free_text(&free_text);
    save_and_report(&mut controller, json, &format!("Also avoiding: {text}"))
}

pub(crate) fn cmd_notes(
    service: PrefsService,
    user_id: &str,
    text: Option<&str>,
    clear: bool,
    json: bool,
) -> Result<()> {
    let mut controller = load_controller(service, user_id)?;

    match (text, clear) {
        (Some(_), true) => bail!("Pass either new notes or --clear, not both"),
        (None, false) => {
            // No arguments: just print the current notes.
            let notes = controller.form().comfort_notes.clone();
            if json {
                println!("{}", serde_json::json!({ "comfort_notes": notes }));
            } else if notes.is_empty() {
                eprintln!("No comfort notes set.");
            } else {
                println!("{notes}");
            }
            Ok(())
        }
        (Some(text), false) => {
            controller.set_comfort_notes(text);
            save_and_report(&mut controller, json, "Comfort notes updated")
        }
        (None, true) => {
            controller.set_comfort_notes("");
            save_and_report(&mut controller, json, "Comfort notes cleared")
        }
    }
}
