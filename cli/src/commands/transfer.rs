use std::path::Path;

use anyhow::{Context, Result, bail};

use attire_core::models::{EXPORT_VERSION, PrefsExport};
use attire_core::service::PrefsService;

pub(crate) fn cmd_export(
    service: &PrefsService,
    user_id: &str,
    file: Option<&Path>,
) -> Result<()> {
    let export = service.export_prefs(user_id)?;
    if export.prefs.is_none() {
        eprintln!("No preferences saved yet; exporting an empty file.");
    }

    let payload = serde_json::to_string_pretty(&export)?;
    match file {
        Some(path) => {
            std::fs::write(path, payload)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported preferences to {}", path.display());
        }
        None => println!("{payload}"),
    }
    Ok(())
}

pub(crate) fn cmd_import(service: &PrefsService, file: &Path, json: bool) -> Result<()> {
    let payload = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let export: PrefsExport =
        serde_json::from_str(&payload).context("File is not a valid preferences export")?;

    if export.version > EXPORT_VERSION {
        bail!(
            "Export format version {} is newer than this build supports ({EXPORT_VERSION})",
            export.version
        );
    }

    match service.import_prefs(&export)? {
        Some(record) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Imported preferences from {}", file.display());
            }
        }
        None => eprintln!("File contained no preferences; nothing imported."),
    }
    Ok(())
}
