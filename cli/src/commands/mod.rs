mod set;
mod show;
mod transfer;

pub(crate) use set::{
    cmd_colour, cmd_days, cmd_exclude_add, cmd_exclude_free, cmd_exclude_remove, cmd_mode,
    cmd_notes,
};
pub(crate) use show::cmd_show;
pub(crate) use transfer::{cmd_export, cmd_import};

use anyhow::{Result, bail};

use attire_core::controller::{PrefsController, SaveStatus};
use attire_core::service::PrefsService;

/// Build a controller over `service` with the stored record loaded.
pub(crate) fn load_controller(service: PrefsService, user_id: &str) -> Result<PrefsController> {
    let mut controller = PrefsController::new(service, user_id);
    controller.load()?;
    Ok(controller)
}

/// Save the controller's form and print the outcome.
pub(crate) fn save_and_report(
    controller: &mut PrefsController,
    json: bool,
    message: &str,
) -> Result<()> {
    match controller.save() {
        SaveStatus::Clean => {
            if json {
                println!("{}", serde_json::to_string_pretty(controller.form())?);
            } else {
                println!("{message}");
            }
            Ok(())
        }
        SaveStatus::Saving | SaveStatus::ErrorWithRetry => {
            let reason = controller
                .error_message()
                .unwrap_or("Couldn't save your preferences.");
            if json {
                println!("{}", serde_json::json!({ "error": reason }));
            }
            bail!("{reason}")
        }
    }
}
