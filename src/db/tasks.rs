//! Task catalog operations
//!
//! Tasks are owned by content admins and enter the core through bulk
//! seeding; evaluation treats them as read-only.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::decode_err;
use crate::error::CoreError;
use crate::model::TaskType;

/// Task row from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub task_type: TaskType,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub allowed_radius_m: Option<f64>,
    /// Never serialized out through the API
    #[serde(skip_serializing)]
    pub qr_secret: Option<String>,
    pub is_published: bool,
    pub created_at: String,
}

impl TaskRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let type_str: String = row.get("task_type")?;
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            task_type: TaskType::parse(&type_str).map_err(decode_err)?,
            category: row.get("category")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            allowed_radius_m: row.get("allowed_radius_m")?,
            qr_secret: row.get("qr_secret")?,
            is_published: row.get::<_, i64>("is_published")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for seeding a task
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub id: String,
    pub title: String,
    pub task_type: TaskType,
    pub category: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub allowed_radius_m: Option<f64>,
    #[serde(default)]
    pub qr_secret: Option<String>,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

fn default_published() -> bool {
    true
}

/// Get a published task by ID
pub fn get_task(conn: &Connection, id: &str) -> Result<Option<TaskRow>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM tasks WHERE id = ?")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params![id])
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?;

    match rows
        .next()
        .map_err(|e| CoreError::Storage(format!("Row fetch failed: {}", e)))?
    {
        Some(row) => Ok(Some(
            TaskRow::from_row(row).map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?,
        )),
        None => Ok(None),
    }
}

/// Count published tasks in a category (the denominator of completion %)
pub fn count_in_category(conn: &Connection, category: &str) -> Result<i64, CoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE category = ? AND is_published = 1",
        params![category],
        |row| row.get(0),
    )
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// Bulk seed tasks: insert new ids, skip existing ones
pub fn bulk_create_tasks(
    conn: &mut Connection,
    items: Vec<CreateTaskInput>,
) -> Result<BulkResult, CoreError> {
    for input in &items {
        validate_task_input(input)?;
    }

    let tx = conn
        .transaction()
        .map_err(|e| CoreError::Storage(format!("Transaction failed: {}", e)))?;

    let mut inserted = 0u64;
    let mut skipped = 0u64;
    let mut errors = vec![];

    for input in items {
        let result = tx.execute(
            r#"
            INSERT OR IGNORE INTO tasks (
                id, title, task_type, category,
                latitude, longitude, allowed_radius_m, qr_secret, is_published
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                input.id,
                input.title,
                input.task_type.as_str(),
                input.category,
                input.latitude,
                input.longitude,
                input.allowed_radius_m,
                input.qr_secret,
                input.is_published as i64,
            ],
        );

        match result {
            Ok(0) => skipped += 1,
            Ok(_) => inserted += 1,
            Err(e) => errors.push(format!("{}: {}", input.id, e)),
        }
    }

    tx.commit()
        .map_err(|e| CoreError::Storage(format!("Commit failed: {}", e)))?;

    Ok(BulkResult {
        inserted,
        skipped,
        errors,
    })
}

/// A checkin task must carry exactly one proof config
fn validate_task_input(input: &CreateTaskInput) -> Result<(), CoreError> {
    if input.task_type != TaskType::Checkin {
        return Ok(());
    }
    let has_geofence = input.latitude.is_some()
        && input.longitude.is_some()
        && input.allowed_radius_m.is_some();
    let has_qr = input.qr_secret.is_some();
    if !has_geofence && !has_qr {
        return Err(CoreError::InvalidInput(format!(
            "Checkin task {} needs target coordinates + radius or a QR secret",
            input.id
        )));
    }
    if let Some(radius) = input.allowed_radius_m {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "Checkin task {} has a non-positive radius",
                input.id
            )));
        }
    }
    Ok(())
}

/// Result of a bulk seed operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub inserted: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}
