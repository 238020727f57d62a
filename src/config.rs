//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then values stored in
//! `local_settings` (category `pos`), then `KIOSKO_*` environment variables.

use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db;
use crate::error::{PosError, Result};
use crate::ticket::TicketBackend;

pub const SETTINGS_CATEGORY: &str = "pos";
pub const DEFAULT_STORE_NAME: &str = "KIOSKO PRO";

pub const ENV_DATA_DIR: &str = "KIOSKO_DATA_DIR";
pub const ENV_DB_PATH: &str = "KIOSKO_DB_PATH";
pub const ENV_TICKETS_DIR: &str = "KIOSKO_TICKETS_DIR";
pub const ENV_TICKET_BACKEND: &str = "KIOSKO_TICKET_BACKEND";
pub const ENV_STORE_NAME: &str = "KIOSKO_STORE_NAME";
pub const ENV_OPEN_TICKETS: &str = "KIOSKO_OPEN_TICKETS";

/// Keys accepted by [`set_setting`].
pub const SETTING_KEYS: &[&str] = &["store_name", "ticket_backend", "open_tickets", "tickets_dir"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub tickets_dir: PathBuf,
    pub simulation_tickets_dir: PathBuf,
    pub log_dir: PathBuf,
    pub store_name: String,
    pub ticket_backend: TicketBackend,
    /// Open each ticket with the system viewer once written.
    pub open_tickets: bool,
}

/// Platform data directory for the application.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("kiosko-pos")
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "si" | "sí" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PosConfig {
    /// Defaults rooted at `data_dir`, ignoring the environment.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            db_path: data_dir.join("kiosko.db"),
            tickets_dir: data_dir.join("tickets_pdf"),
            simulation_tickets_dir: data_dir.join("tickets_simulacion"),
            log_dir: data_dir.join("logs"),
            store_name: DEFAULT_STORE_NAME.to_string(),
            ticket_backend: TicketBackend::Auto,
            open_tickets: false,
            data_dir,
        }
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::resolve(None)
    }

    /// Like [`PosConfig::from_env`], with an explicit data directory taking
    /// precedence over `KIOSKO_DATA_DIR`.
    pub fn resolve(data_dir: Option<&Path>) -> Self {
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .or_else(|| env_value(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        let mut config = Self::with_data_dir(data_dir);
        config.apply_env();
        config
    }

    /// Layer stored settings under the environment overrides.
    pub fn apply_settings(&mut self, conn: &Connection) -> Result<()> {
        for (key, value) in db::get_settings_in(conn, SETTINGS_CATEGORY)? {
            if let Err(e) = self.apply_one(&key, &value) {
                warn!(key = %key, error = %e, "Ignoring invalid stored setting");
            }
        }
        self.apply_env();
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(path) = env_value(ENV_DB_PATH) {
            self.db_path = PathBuf::from(path);
        }
        for (env_key, key) in [
            (ENV_TICKETS_DIR, "tickets_dir"),
            (ENV_TICKET_BACKEND, "ticket_backend"),
            (ENV_STORE_NAME, "store_name"),
            (ENV_OPEN_TICKETS, "open_tickets"),
        ] {
            if let Some(value) = env_value(env_key) {
                if let Err(e) = self.apply_one(key, &value) {
                    warn!(variable = env_key, error = %e, "Ignoring invalid environment value");
                }
            }
        }
    }

    fn apply_one(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "store_name" => {
                let name = value.trim();
                if name.is_empty() {
                    return Err(PosError::Config("store_name cannot be empty".into()));
                }
                self.store_name = name.to_string();
            }
            "ticket_backend" => {
                self.ticket_backend = value.parse().map_err(PosError::Config)?;
            }
            "open_tickets" => {
                self.open_tickets = parse_bool(value)
                    .ok_or_else(|| PosError::Config(format!("invalid boolean '{value}'")))?;
            }
            "tickets_dir" => {
                if value.trim().is_empty() {
                    return Err(PosError::Config("tickets_dir cannot be empty".into()));
                }
                self.tickets_dir = PathBuf::from(value.trim());
            }
            other => return Err(PosError::Config(format!("unknown setting '{other}'"))),
        }
        Ok(())
    }
}

/// Validate and persist a setting.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    // Validate against a scratch config so bad values never reach the table.
    PosConfig::with_data_dir(".").apply_one(key, value)?;
    db::set_setting(conn, SETTINGS_CATEGORY, key, value.trim())
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    if !SETTING_KEYS.contains(&key) {
        return Err(PosError::Config(format!("unknown setting '{key}'")));
    }
    Ok(db::get_setting(conn, SETTINGS_CATEGORY, key))
}
