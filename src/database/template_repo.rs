// Template repository for ask-ai
// Handles CRUD operations for prompt templates

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Deserialize;
use std::path::Path;

use super::models::{PromptTemplate, CreatePromptTemplate, UpdatePromptTemplate};
use super::settings_repo::{reset_index_after_removal_impl, KEY_DEFAULT_PROMPT_INDEX};
use super::DatabaseManager;

/// Entry of a template import file: `[{"name": ..., "template": ...}, ...]`
#[derive(Debug, Deserialize)]
struct ImportedTemplate {
    name: String,
    template: String,
}

const TEMPLATE_COLUMNS: &str = "id, name, template, is_builtin, sort_order, created_at";

impl DatabaseManager {
    /// Get all prompt templates, ordered by sort_order then created_at
    pub fn list_templates(&self) -> Result<Vec<PromptTemplate>> {
        self.with_connection(|conn| {
            list_templates_impl(conn)
        })
    }

    /// Get a single template by ID
    pub fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>> {
        self.with_connection(|conn| {
            get_template_impl(conn, id)
        })
    }

    /// Find a template by its display name (case-insensitive)
    pub fn find_template_by_name(&self, name: &str) -> Result<Option<PromptTemplate>> {
        let wanted = name.to_lowercase();
        Ok(self.list_templates()?
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted))
    }

    /// Create a new custom template
    pub fn create_template(&self, input: &CreatePromptTemplate) -> Result<String> {
        self.with_connection(|conn| {
            create_template_impl(conn, input)
        })
    }

    /// Update an existing template (only custom templates can be updated)
    pub fn update_template(&self, id: &str, input: &UpdatePromptTemplate) -> Result<()> {
        self.with_connection(|conn| {
            update_template_impl(conn, id, input)
        })
    }

    /// Delete a template (only custom templates can be deleted). Resets the
    /// default template index to 0 when it pointed at the deleted template.
    pub fn delete_template(&self, id: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_template_impl(conn, id)
        })
    }

    /// Duplicate a template (creates a custom copy)
    pub fn duplicate_template(&self, id: &str) -> Result<String> {
        self.with_connection(|conn| {
            duplicate_template_impl(conn, id)
        })
    }

    /// Import custom templates from a JSON file, skipping names that already exist
    pub fn import_templates_from_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file {:?}", path))?;
        let entries: Vec<ImportedTemplate> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse template file {:?}", path))?;

        self.with_connection(|conn| {
            import_templates_impl(conn, entries)
        })
    }
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        template: row.get(2)?,
        is_builtin: row.get::<_, i32>(3)? != 0,
        sort_order: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn list_templates_impl(conn: &Connection) -> Result<Vec<PromptTemplate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM prompt_templates ORDER BY sort_order ASC, created_at ASC",
        TEMPLATE_COLUMNS
    )).context("Failed to prepare list_templates query")?;

    let templates = stmt.query_map([], row_to_template)
        .context("Failed to query templates")?;

    templates.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect templates")
}

fn get_template_impl(conn: &Connection, id: &str) -> Result<Option<PromptTemplate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM prompt_templates WHERE id = ?",
        TEMPLATE_COLUMNS
    )).context("Failed to prepare get_template query")?;

    match stmt.query_row(params![id], row_to_template) {
        Ok(template) => Ok(Some(template)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get template"),
    }
}

fn create_template_impl(conn: &Connection, input: &CreatePromptTemplate) -> Result<String> {
    let id = format!("custom_{}", uuid::Uuid::new_v4());
    let now = chrono::Utc::now().to_rfc3339();

    let sort_order = match input.sort_order {
        Some(order) => order,
        None => get_next_sort_order_impl(conn)?,
    };

    conn.execute(
        r#"
        INSERT INTO prompt_templates (id, name, template, is_builtin, sort_order, created_at)
        VALUES (?1, ?2, ?3, 0, ?4, ?5)
        "#,
        params![id, input.name, input.template, sort_order, now],
    ).context("Failed to create template")?;

    Ok(id)
}

fn ensure_custom(conn: &Connection, id: &str, action: &str) -> Result<()> {
    let is_builtin: i32 = conn.query_row(
        "SELECT is_builtin FROM prompt_templates WHERE id = ?",
        params![id],
        |row| row.get(0),
    ).context("Template not found")?;

    if is_builtin != 0 {
        return Err(anyhow::anyhow!("Cannot {} built-in templates", action));
    }
    Ok(())
}

fn update_template_impl(conn: &Connection, id: &str, input: &UpdatePromptTemplate) -> Result<()> {
    ensure_custom(conn, id, "update")?;

    let mut updates = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = input.name {
        updates.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(ref template) = input.template {
        updates.push("template = ?");
        values.push(Box::new(template.clone()));
    }
    if let Some(sort_order) = input.sort_order {
        updates.push("sort_order = ?");
        values.push(Box::new(sort_order));
    }

    if updates.is_empty() {
        return Ok(());
    }

    let query = format!(
        "UPDATE prompt_templates SET {} WHERE id = ?",
        updates.join(", ")
    );
    values.push(Box::new(id.to_string()));

    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&query, params.as_slice()).context("Failed to update template")?;

    Ok(())
}

fn delete_template_impl(conn: &Connection, id: &str) -> Result<()> {
    ensure_custom(conn, id, "delete")?;

    let templates = list_templates_impl(conn)?;
    let position = templates.iter().position(|t| t.id == id);

    conn.execute(
        "DELETE FROM prompt_templates WHERE id = ? AND is_builtin = 0",
        params![id],
    ).context("Failed to delete template")?;

    reset_index_after_removal_impl(
        conn,
        KEY_DEFAULT_PROMPT_INDEX,
        position,
        templates.len().saturating_sub(1),
    )
}

fn duplicate_template_impl(conn: &Connection, id: &str) -> Result<String> {
    let original = get_template_impl(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Template not found"))?;

    create_template_impl(conn, &CreatePromptTemplate {
        name: format!("{} (Copy)", original.name),
        template: original.template,
        sort_order: None,
    })
}

fn import_templates_impl(conn: &Connection, entries: Vec<ImportedTemplate>) -> Result<usize> {
    let mut existing: Vec<String> = list_templates_impl(conn)?
        .into_iter()
        .map(|t| t.name.to_lowercase())
        .collect();

    let mut imported = 0;
    for entry in entries {
        if existing.contains(&entry.name.to_lowercase()) {
            log::debug!("Template '{}' already exists, skipping", entry.name);
            continue;
        }
        create_template_impl(conn, &CreatePromptTemplate {
            name: entry.name.clone(),
            template: entry.template,
            sort_order: None,
        })?;
        log::info!("Imported template: {}", entry.name);
        existing.push(entry.name.to_lowercase());
        imported += 1;
    }

    Ok(imported)
}

fn get_next_sort_order_impl(conn: &Connection) -> Result<i32> {
    let max_order: Option<i32> = conn.query_row(
        "SELECT MAX(sort_order) FROM prompt_templates",
        [],
        |row| row.get(0),
    ).context("Failed to get max sort_order")?;

    Ok(max_order.unwrap_or(0) + 1)
}
