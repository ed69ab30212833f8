// Settings repository for ask-ai
// Handles CRUD operations for application settings

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::{AbortPolicy, AllSettings, Setting};
use super::DatabaseManager;

pub const KEY_DEFAULT_API_INDEX: &str = "default_api_index";
pub const KEY_DEFAULT_PROMPT_INDEX: &str = "default_prompt_index";
pub const KEY_CONTEXT_RADIUS: &str = "context_radius";
pub const KEY_ABORT_POLICY: &str = "abort_policy";
pub const KEY_REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";

/// Keys accepted by [`DatabaseManager::set_setting_checked`], with their value type
pub const KNOWN_SETTINGS: &[(&str, &str)] = &[
    (KEY_DEFAULT_API_INDEX, "integer"),
    (KEY_DEFAULT_PROMPT_INDEX, "integer"),
    (KEY_CONTEXT_RADIUS, "integer"),
    (KEY_ABORT_POLICY, "string"),
    (KEY_REQUEST_TIMEOUT_SECS, "integer"),
];

impl DatabaseManager {
    /// Get a single setting by key
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            get_setting_impl(conn, key)
        })
    }

    /// Set a single setting
    pub fn set_setting(&self, key: &str, value: &str, value_type: &str) -> Result<()> {
        self.with_connection(|conn| {
            set_setting_impl(conn, key, value, value_type)
        })
    }

    /// Set a known setting after validating its value
    pub fn set_setting_checked(&self, key: &str, value: &str) -> Result<()> {
        let (_, value_type) = KNOWN_SETTINGS
            .iter()
            .find(|(k, _)| *k == key)
            .ok_or_else(|| anyhow::anyhow!("Unknown setting key: {}", key))?;

        match *value_type {
            "integer" => {
                value.parse::<u64>()
                    .with_context(|| format!("Setting '{}' expects a non-negative integer", key))?;
            }
            _ if key == KEY_ABORT_POLICY => {
                value.parse::<AbortPolicy>().map_err(|e| anyhow::anyhow!(e))?;
            }
            _ => {}
        }

        self.set_setting(key, value, value_type)
    }

    /// Get all settings
    pub fn get_all_settings_list(&self) -> Result<Vec<Setting>> {
        self.with_connection(|conn| {
            get_all_settings_impl(conn)
        })
    }

    /// Load all settings as a structured object
    pub fn load_all_settings(&self) -> Result<AllSettings> {
        self.with_connection(|conn| {
            load_all_settings_impl(conn)
        })
    }

    /// Set an integer setting
    pub fn set_usize_setting(&self, key: &str, value: usize) -> Result<()> {
        self.set_setting(key, &value.to_string(), "integer")
    }

    pub fn set_default_api_index(&self, index: usize) -> Result<()> {
        self.set_usize_setting(KEY_DEFAULT_API_INDEX, index)
    }

    pub fn set_default_prompt_index(&self, index: usize) -> Result<()> {
        self.set_usize_setting(KEY_DEFAULT_PROMPT_INDEX, index)
    }

    pub fn set_abort_policy(&self, policy: AbortPolicy) -> Result<()> {
        self.set_setting(KEY_ABORT_POLICY, &policy.to_string(), "string")
    }

    /// Delete a setting by key
    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_setting_impl(conn, key)
        })
    }
}

pub(crate) fn get_setting_impl(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM settings WHERE key = ?"
    ).context("Failed to prepare get_setting query")?;

    let result = stmt.query_row(params![key], |row| row.get(0));

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get setting"),
    }
}

pub(crate) fn set_setting_impl(conn: &Connection, key: &str, value: &str, value_type: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (key, value, value_type, updated_at)
        VALUES (?1, ?2, ?3, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            value_type = excluded.value_type,
            updated_at = datetime('now')
        "#,
        params![key, value, value_type],
    ).context("Failed to set setting")?;

    Ok(())
}

/// Stored list index under `key`, 0 when unset or unparsable
pub(crate) fn get_index_setting_impl(conn: &Connection, key: &str) -> Result<usize> {
    Ok(get_setting_impl(conn, key)?
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0))
}

/// After removing the item at `removed_position` from a list now holding
/// `remaining` items, point the default index under `key` back at the first
/// item if it referred to the removed one or is out of range.
pub(crate) fn reset_index_after_removal_impl(
    conn: &Connection,
    key: &str,
    removed_position: Option<usize>,
    remaining: usize,
) -> Result<()> {
    let current = get_index_setting_impl(conn, key)?;
    if removed_position == Some(current) || current >= remaining {
        if current != 0 {
            log::info!("Default for '{}' removed, resetting index {} to 0", key, current);
        }
        set_setting_impl(conn, key, "0", "integer")?;
    }
    Ok(())
}

fn get_all_settings_impl(conn: &Connection) -> Result<Vec<Setting>> {
    let mut stmt = conn.prepare(
        "SELECT key, value, value_type, updated_at FROM settings ORDER BY key"
    ).context("Failed to prepare get_all_settings query")?;

    let settings = stmt.query_map([], |row| {
        Ok(Setting {
            key: row.get(0)?,
            value: row.get(1)?,
            value_type: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }).context("Failed to query settings")?;

    settings.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect settings")
}

fn parse_or_default<T: std::str::FromStr>(key: &str, value: &str, default: T) -> T {
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            log::warn!("Ignoring invalid value for setting '{}': {}", key, value);
            default
        }
    }
}

fn load_all_settings_impl(conn: &Connection) -> Result<AllSettings> {
    let mut settings = AllSettings::default();
    let defaults = AllSettings::default();

    let mut stmt = conn.prepare(
        "SELECT key, value FROM settings"
    ).context("Failed to prepare load_all_settings query")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
        ))
    }).context("Failed to query settings")?;

    for row in rows {
        let (key, value) = row.context("Failed to read setting row")?;

        match key.as_str() {
            KEY_DEFAULT_API_INDEX => {
                settings.default_api_index = parse_or_default(&key, &value, defaults.default_api_index)
            }
            KEY_DEFAULT_PROMPT_INDEX => {
                settings.default_prompt_index = parse_or_default(&key, &value, defaults.default_prompt_index)
            }
            KEY_CONTEXT_RADIUS => {
                settings.context_radius = parse_or_default(&key, &value, defaults.context_radius)
            }
            KEY_ABORT_POLICY => {
                settings.abort_policy = parse_or_default(&key, &value, defaults.abort_policy)
            }
            KEY_REQUEST_TIMEOUT_SECS => {
                settings.request_timeout_secs = parse_or_default(&key, &value, defaults.request_timeout_secs)
            }
            _ => {
                log::debug!("Unknown setting key: {}", key);
            }
        }
    }

    Ok(settings)
}

fn delete_setting_impl(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM settings WHERE key = ?",
        params![key],
    ).context("Failed to delete setting")?;

    Ok(())
}
