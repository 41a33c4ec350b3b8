use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use attire_core::mapping;
use attire_core::models::UNDECIDED;
use attire_core::service::{FetchState, PrefsService};

pub(crate) fn cmd_show(service: &PrefsService, user_id: &str, json: bool) -> Result<()> {
    let record = match service.get_prefs(Some(user_id))? {
        // A local identity is always supplied, so Disabled never fires here.
        FetchState::Disabled => None,
        FetchState::Loaded(record) => record,
    };

    let first_run = record.is_none();
    let form = mapping::to_form(record.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&form)?);
        return Ok(());
    }

    if first_run {
        eprintln!("No preferences saved yet; showing defaults.");
    }

    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        name: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let colour = if form.colour_tendency == UNDECIDED {
        "(undecided)".to_string()
    } else {
        form.colour_tendency.clone()
    };
    let exclusions = if form.checklist.is_empty() {
        "-".to_string()
    } else {
        form.checklist.join(", ")
    };
    let free_text = if form.free_text.is_empty() {
        "-".to_string()
    } else {
        form.free_text.lines().collect::<Vec<_>>().join("; ")
    };
    let notes = if form.comfort_notes.is_empty() {
        "-".to_string()
    } else {
        form.comfort_notes.clone()
    };

    let rows = vec![
        SettingRow {
            name: "Colour tendency",
            value: colour,
        },
        SettingRow {
            name: "Excluded categories",
            value: exclusions,
        },
        SettingRow {
            name: "Also avoid",
            value: free_text,
        },
        SettingRow {
            name: "No-repeat days",
            value: form.no_repeat_days.to_string(),
        },
        SettingRow {
            name: "No-repeat mode",
            value: form.no_repeat_mode.to_string(),
        },
        SettingRow {
            name: "Comfort notes",
            value: notes,
        },
    ];

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    Ok(())
}
