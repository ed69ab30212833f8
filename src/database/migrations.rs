// Database migrations for ask-ai
// Creates and updates the settings store schema

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    log::debug!("Settings store at schema version {}", SCHEMA_VERSION);
    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    ).context("Failed to inspect schema")?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    ).context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

/// Initial schema (version 1): settings and API endpoints
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v1 - settings and endpoints");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Key/value application settings
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- OpenAI-compatible chat endpoints
        CREATE TABLE IF NOT EXISTS api_endpoints (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL DEFAULT '',
            api_key TEXT NOT NULL DEFAULT '',
            model TEXT NOT NULL DEFAULT '',
            min_request_interval_ms INTEGER NOT NULL DEFAULT 0,
            default_model TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_api_endpoints_sort
        ON api_endpoints(sort_order, created_at);

        INSERT INTO schema_version (version) VALUES (1);
    "#).context("Failed to run migration v1")?;

    log::info!("Migration v1 completed successfully");
    Ok(())
}

/// Prompt templates (version 2) with built-in defaults
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v2 - prompt templates");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS prompt_templates (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            template TEXT NOT NULL,
            is_builtin INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_prompt_templates_sort
        ON prompt_templates(sort_order, created_at);

        INSERT INTO schema_version (version) VALUES (2);
    "#).context("Failed to run migration v2")?;

    seed_builtin_templates(conn)?;

    log::info!("Migration v2 completed successfully");
    Ok(())
}

/// Built-in templates: (id, name, template)
const BUILTIN_TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "builtin_explain_translate",
        "Translate & explain",
        "Work on the selection below as follows.\n\
         selection:\n{{selection}}\n\n\
         Requirements:\n\
         - If the selection is a single English word, only translate it and give its etymology; ignore the other requirements.\n\
         - If the selection is an English passage, give a literal translation and a natural one, and explain the key phrases.\n\
         - If the selection is a Chinese passage, explain what it means in plain language.\n\
         - Use the context where it helps, but only translate the selection.\n\n\
         Context: {{context}}",
    ),
    (
        "builtin_translate",
        "Translate to Chinese",
        "Translate the following English text into Chinese:\n{{selection}}",
    ),
    (
        "builtin_plain_words",
        "Explain in plain words",
        "Explain the following in plain, everyday language:\n{{selection}}",
    ),
];

fn seed_builtin_templates(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO prompt_templates (id, name, template, is_builtin, sort_order) VALUES (?1, ?2, ?3, 1, ?4)"
    ).context("Failed to prepare template seed")?;

    for (index, (id, name, template)) in BUILTIN_TEMPLATES.iter().enumerate() {
        stmt.execute(rusqlite::params![id, name, template, index as i32 + 1])
            .with_context(|| format!("Failed to seed template {}", id))?;
    }

    log::info!("Seeded {} built-in prompt templates", BUILTIN_TEMPLATES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_migrations() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();

        run_migrations(&conn).unwrap();

        let version: i32 = conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let builtin_count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM prompt_templates WHERE is_builtin = 1",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(builtin_count, 3);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("test.db")).unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i32 = conn.query_row(
            "SELECT COUNT(*) FROM schema_version",
            [],
            |row| row.get(0),
        ).unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_builtin_templates_reference_selection() {
        for (id, _, template) in BUILTIN_TEMPLATES {
            assert!(template.contains("{{selection}}"), "{} lacks selection token", id);
        }
    }
}
