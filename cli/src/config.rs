use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "attire").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("attire.db");

        Ok(Config { db_path, data_dir })
    }

    /// Load the local user identity from disk, or generate a new one.
    ///
    /// The identity keys the preferences row; generating one on first run
    /// makes the CLI work without any sign-in step.
    pub fn load_or_create_user_id(&self) -> Result<String> {
        let path = self.data_dir.join("user_id");

        if path.exists() {
            let id = std::fs::read_to_string(&path).context("Failed to read user id file")?;
            let id = id.trim().to_string();
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        std::fs::write(&path, &id).context("Failed to write user id file")?;
        Ok(id)
    }
}
