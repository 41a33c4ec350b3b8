mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_colour, cmd_days, cmd_exclude_add, cmd_exclude_free, cmd_exclude_remove, cmd_export,
    cmd_import, cmd_mode, cmd_notes, cmd_show,
};
use crate::config::Config;
use attire_core::db::Database;
use attire_core::service::PrefsService;

#[derive(Parser)]
#[command(
    name = "attire",
    version,
    about = "A simple, local-first styling-preferences CLI",
    long_about = "\nManage your styling preferences from the terminal: colour tendency,\ncategory exclusions, the no-repeat window, and comfort notes.\nEverything is stored locally."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the no-repeat window in days (0-90)
    Days {
        /// Number of days
        days: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set what the no-repeat window applies to: item or outfit
    Mode {
        /// 'item' or 'outfit'
        mode: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the colour tendency ('undecided' to clear)
    Colour {
        /// Tag: neutrals, brights, pastels, earth_tones, monochrome
        tag: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage category exclusions
    Exclude {
        #[command(subcommand)]
        command: ExcludeCommands,
    },
    /// Show, set, or clear comfort notes
    Notes {
        /// New notes text (omit to show current notes)
        text: Option<String>,
        /// Clear the notes
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export preferences to a JSON file (or stdout)
    Export {
        /// Destination file (default: stdout)
        file: Option<std::path::PathBuf>,
    },
    /// Import preferences from an exported JSON file
    Import {
        /// Path to the export file
        file: std::path::PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExcludeCommands {
    /// Exclude a category: skirts, dresses, heels, sleeveless, shorts, crop_tops
    Add {
        /// Category tag
        tag: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an exclusion (category tag or free-text entry)
    Remove {
        /// Category tag or free-text entry to remove
        entry: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a free-text exclusion (e.g. "no wool")
    Free {
        /// Text of the exclusion
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let user_id = config.load_or_create_user_id()?;
    let db = Database::open(&config.db_path)?;
    let service = PrefsService::new(Box::new(db));

    match cli.command {
        Commands::Show { json } => cmd_show(&service, &user_id, json),
        Commands::Days { days, json } => cmd_days(service, &user_id, days, json),
        Commands::Mode { mode, json } => cmd_mode(service, &user_id, &mode, json),
        Commands::Colour { tag, json } => cmd_colour(service, &user_id, &tag, json),
        Commands::Exclude { command } => match command {
            ExcludeCommands::Add { tag, json } => cmd_exclude_add(service, &user_id, &tag, json),
            ExcludeCommands::Remove { entry, json } => {
                cmd_exclude_remove(service, &user_id, &entry, json)
            }
            ExcludeCommands::Free { text, json } => {
                cmd_exclude_free(service, &user_id, &text, json)
            }
        },
        Commands::Notes { text, clear, json } => {
            cmd_notes(service, &user_id, text.as_deref(), clear, json)
        }
        Commands::Export { file } => cmd_export(&service, &user_id, file.as_deref()),
        Commands::Import { file, json } => cmd_import(&service, &file, json),
    }
}
