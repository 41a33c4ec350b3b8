use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::models::{NewStylePrefs, PrefsPatch, StylePrefs};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS style_prefs (
                    user_id TEXT PRIMARY KEY,
                    no_repeat_days INTEGER,
                    no_repeat_mode TEXT NOT NULL DEFAULT 'item',
                    colour_preferences TEXT NOT NULL DEFAULT '[]',
                    exclusions TEXT NOT NULL DEFAULT '[]',
                    comfort_notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Select-by-key with an optional row result. A missing row is `None`,
    /// never an error.
    pub fn get_prefs(&self, user_id: &str) -> Result<Option<StylePrefs>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, no_repeat_days, no_repeat_mode, colour_preferences,
                    exclusions, comfort_notes, created_at, updated_at
             FROM style_prefs WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query(params![user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::prefs_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Atomic insert-or-update keyed by `user_id`. `created_at` is set on
    /// first insert only; `updated_at` follows every write.
    pub fn upsert_prefs(&self, new: &NewStylePrefs) -> Result<StylePrefs> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO style_prefs (user_id, no_repeat_days, no_repeat_mode,
                                      colour_preferences, exclusions, comfort_notes,
                                      created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                no_repeat_days = excluded.no_repeat_days,
                no_repeat_mode = excluded.no_repeat_mode,
                colour_preferences = excluded.colour_preferences,
                exclusions = excluded.exclusions,
                comfort_notes = excluded.comfort_notes,
                updated_at = excluded.updated_at",
            params![
                new.user_id,
                new.no_repeat_days,
                new.no_repeat_mode,
                serde_json::to_string(&new.colour_preferences)?,
                serde_json::to_string(&new.exclusions)?,
                new.comfort_notes,
                now
            ],
        )?;
        self.get_prefs(&new.user_id)?
            .context("Preferences row not found after upsert")
    }

    /// Merge a partial update over the existing row (or over defaults when
    /// the row doesn't exist yet — creation is lazy, on first save) and
    /// upsert the result. Last write wins; there is no version column.
    pub fn apply_patch(&self, user_id: &str, patch: &PrefsPatch) -> Result<StylePrefs> {
        let mut merged = match self.get_prefs(user_id)? {
            Some(existing) => NewStylePrefs {
                user_id: existing.user_id,
                no_repeat_days: existing.no_repeat_days,
                no_repeat_mode: existing.no_repeat_mode,
                colour_preferences: existing.colour_preferences,
                exclusions: existing.exclusions,
                comfort_notes: existing.comfort_notes,
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

        self.upsert_prefs(&merged)
    }

    fn prefs_from_row(row: &rusqlite::Row<'_>) -> Result<StylePrefs> {
        let colour_json: String = row.get(3)?;
        let exclusions_json: String = row.get(4)?;
        Ok(StylePrefs {
            user_id: row.get(0)?,
            no_repeat_days: row.get(1)?,
            no_repeat_mode: row.get(2)?,
            colour_preferences: serde_json::from_str(&colour_json)
                .context("Malformed colour_preferences column")?,
            exclusions: serde_json::from_str(&exclusions_json)
                .context("Malformed exclusions column")?,
            comfort_notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}
