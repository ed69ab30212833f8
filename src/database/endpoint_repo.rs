// Endpoint repository for ask-ai
// Handles CRUD operations for chat API endpoints

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::{ApiEndpoint, CreateApiEndpoint, RequestPolicy, UpdateApiEndpoint};
use super::settings_repo::{
    get_index_setting_impl, reset_index_after_removal_impl, KEY_DEFAULT_API_INDEX,
};
use super::DatabaseManager;

const ENDPOINT_COLUMNS: &str =
    "id, name, url, api_key, model, min_request_interval_ms, default_model, sort_order";

impl DatabaseManager {
    /// Get all endpoints in display order
    pub fn list_endpoints(&self) -> Result<Vec<ApiEndpoint>> {
        self.with_connection(|conn| {
            list_endpoints_impl(conn)
        })
    }

    /// Get a single endpoint by ID
    pub fn get_endpoint(&self, id: &str) -> Result<Option<ApiEndpoint>> {
        self.with_connection(|conn| {
            get_endpoint_impl(conn, id)
        })
    }

    /// Create a new endpoint, appended after the existing ones
    pub fn create_endpoint(&self, input: &CreateApiEndpoint) -> Result<String> {
        self.with_connection(|conn| {
            create_endpoint_impl(conn, input)
        })
    }

    /// Update an existing endpoint
    pub fn update_endpoint(&self, id: &str, input: &UpdateApiEndpoint) -> Result<()> {
        self.with_connection(|conn| {
            update_endpoint_impl(conn, id, input)
        })
    }

    /// Delete an endpoint. Resets the default index to 0 when it no longer
    /// points at an endpoint.
    pub fn delete_endpoint(&self, id: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_endpoint_impl(conn, id)
        })
    }

    /// Endpoint for a request: the override index if given, else the stored
    /// default, falling back to the first endpoint when out of range.
    /// `None` only when no endpoint exists.
    pub fn resolve_endpoint(&self, override_index: Option<usize>) -> Result<Option<ApiEndpoint>> {
        self.with_connection(|conn| {
            let endpoints = list_endpoints_impl(conn)?;
            let index = match override_index {
                Some(index) => index,
                None => get_index_setting_impl(conn, KEY_DEFAULT_API_INDEX)?,
            };
            Ok(pick_endpoint(endpoints, index))
        })
    }
}

fn pick_endpoint(mut endpoints: Vec<ApiEndpoint>, index: usize) -> Option<ApiEndpoint> {
    if endpoints.is_empty() {
        return None;
    }
    if index >= endpoints.len() {
        log::warn!(
            "Endpoint index {} out of range ({} configured), using the first",
            index,
            endpoints.len()
        );
        return Some(endpoints.swap_remove(0));
    }
    Some(endpoints.swap_remove(index))
}

fn row_to_endpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiEndpoint> {
    Ok(ApiEndpoint {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        key: row.get(3)?,
        model: row.get(4)?,
        policy: RequestPolicy {
            min_request_interval_ms: row.get::<_, i64>(5)?.max(0) as u64,
            default_model: row.get(6)?,
        },
        sort_order: row.get(7)?,
    })
}

fn list_endpoints_impl(conn: &Connection) -> Result<Vec<ApiEndpoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM api_endpoints ORDER BY sort_order ASC, created_at ASC",
        ENDPOINT_COLUMNS
    )).context("Failed to prepare list_endpoints query")?;

    let endpoints = stmt.query_map([], row_to_endpoint)
        .context("Failed to query endpoints")?;

    endpoints.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect endpoints")
}

fn get_endpoint_impl(conn: &Connection, id: &str) -> Result<Option<ApiEndpoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM api_endpoints WHERE id = ?",
        ENDPOINT_COLUMNS
    )).context("Failed to prepare get_endpoint query")?;

    match stmt.query_row(params![id], row_to_endpoint) {
        Ok(endpoint) => Ok(Some(endpoint)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get endpoint"),
    }
}

fn create_endpoint_impl(conn: &Connection, input: &CreateApiEndpoint) -> Result<String> {
    let id = format!("endpoint_{}", uuid::Uuid::new_v4());
    let now = chrono::Utc::now().to_rfc3339();
    let sort_order = get_next_sort_order_impl(conn)?;

    conn.execute(
        r#"
        INSERT INTO api_endpoints
            (id, name, url, api_key, model, min_request_interval_ms, default_model, sort_order, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            id,
            input.name,
            input.url.trim(),
            input.key.trim(),
            input.model.trim(),
            input.policy.min_request_interval_ms as i64,
            input.policy.default_model,
            sort_order,
            now
        ],
    ).context("Failed to create endpoint")?;

    log::info!("Created endpoint '{}' ({})", input.name, id);
    Ok(id)
}

fn update_endpoint_impl(conn: &Connection, id: &str, input: &UpdateApiEndpoint) -> Result<()> {
    if get_endpoint_impl(conn, id)?.is_none() {
        return Err(anyhow::anyhow!("Endpoint not found: {}", id));
    }

    let mut updates = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = input.name {
        updates.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(ref url) = input.url {
        updates.push("url = ?");
        values.push(Box::new(url.trim().to_string()));
    }
    if let Some(ref key) = input.key {
        updates.push("api_key = ?");
        values.push(Box::new(key.trim().to_string()));
    }
    if let Some(ref model) = input.model {
        updates.push("model = ?");
        values.push(Box::new(model.trim().to_string()));
    }
    if let Some(ref policy) = input.policy {
        updates.push("min_request_interval_ms = ?");
        values.push(Box::new(policy.min_request_interval_ms as i64));
        updates.push("default_model = ?");
        values.push(Box::new(policy.default_model.clone()));
    }
    if let Some(sort_order) = input.sort_order {
        updates.push("sort_order = ?");
        values.push(Box::new(sort_order));
    }

    if updates.is_empty() {
        return Ok(());
    }

    let query = format!(
        "UPDATE api_endpoints SET {} WHERE id = ?",
        updates.join(", ")
    );
    values.push(Box::new(id.to_string()));

    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&query, params.as_slice()).context("Failed to update endpoint")?;

    Ok(())
}

fn delete_endpoint_impl(conn: &Connection, id: &str) -> Result<()> {
    let position = list_endpoints_impl(conn)?
        .iter()
        .position(|e| e.id == id);

    let deleted = conn.execute(
        "DELETE FROM api_endpoints WHERE id = ?",
        params![id],
    ).context("Failed to delete endpoint")?;

    if deleted == 0 {
        return Err(anyhow::anyhow!("Endpoint not found: {}", id));
    }

    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM api_endpoints",
        [],
        |row| row.get(0),
    ).context("Failed to count endpoints")?;

    reset_index_after_removal_impl(conn, KEY_DEFAULT_API_INDEX, position, remaining.max(0) as usize)
}

fn get_next_sort_order_impl(conn: &Connection) -> Result<i32> {
    let max_order: Option<i32> = conn.query_row(
        "SELECT MAX(sort_order) FROM api_endpoints",
        [],
        |row| row.get(0),
    ).context("Failed to get max sort_order")?;

    Ok(max_order.map_or(0, |order| order + 1))
}
