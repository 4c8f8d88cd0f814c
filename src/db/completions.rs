//! Task completion recording and history queries
//!
//! `task_completions` is the system-of-record for "did X complete Y". Rows
//! are created once and never updated; the UNIQUE (user_id, task_id)
//! constraint decides the winner when concurrent attempts race.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::TaskType;

/// Completion row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRow {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub is_correct: bool,
    pub completed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_token: Option<String>,
}

impl CompletionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            task_id: row.get("task_id")?,
            is_correct: row.get::<_, i64>("is_correct")? != 0,
            completed_at: row.get("completed_at")?,
            distance_m: row.get("distance_m")?,
            accuracy_m: row.get("accuracy_m")?,
            qr_token: row.get("qr_token")?,
        })
    }
}

/// Proof metadata persisted with a completion
#[derive(Debug, Clone, Default)]
pub struct ProofMeta {
    pub distance_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub qr_token: Option<String>,
}

/// Record a verified completion exactly once.
///
/// Atomic insert-if-absent: of two concurrent calls for the same (user, task)
/// only one inserts; the loser gets `AlreadyCompleted` without mutating state.
pub fn record_completion(
    conn: &Connection,
    user_id: &str,
    task_id: &str,
    meta: &ProofMeta,
) -> Result<CompletionRow, CoreError> {
    let id = Uuid::new_v4().to_string();
    let completed_at = Utc::now().to_rfc3339();

    let changed = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO task_completions (
                id, user_id, task_id, is_correct, completed_at,
                distance_m, accuracy_m, qr_token
            ) VALUES (?, ?, ?, 1, ?, ?, ?, ?)
            "#,
            params![
                id,
                user_id,
                task_id,
                completed_at,
                meta.distance_m,
                meta.accuracy_m,
                meta.qr_token,
            ],
        )
        .map_err(|e| CoreError::Storage(format!("Insert failed: {}", e)))?;

    if changed == 0 {
        return Err(CoreError::AlreadyCompleted {
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
        });
    }

    get_completion(conn, user_id, task_id)?.ok_or_else(|| {
        CoreError::Storage("Completion not found after insert".to_string())
    })
}

/// Get the completion for a (user, task) pair
pub fn get_completion(
    conn: &Connection,
    user_id: &str,
    task_id: &str,
) -> Result<Option<CompletionRow>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM task_completions WHERE user_id = ? AND task_id = ?")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params![user_id, task_id])
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?;

    match rows
        .next()
        .map_err(|e| CoreError::Storage(format!("Row fetch failed: {}", e)))?
    {
        Some(row) => Ok(Some(CompletionRow::from_row(row).map_err(|e| {
            CoreError::Storage(format!("Row parse failed: {}", e))
        })?)),
        None => Ok(None),
    }
}

/// Distinct correctly-completed tasks of a given type for a user
pub fn count_correct_by_type(
    conn: &Connection,
    user_id: &str,
    task_type: TaskType,
) -> Result<i64, CoreError> {
    conn.query_row(
        r#"
        SELECT COUNT(DISTINCT tc.task_id)
        FROM task_completions tc
        INNER JOIN tasks t ON t.id = tc.task_id
        WHERE tc.user_id = ? AND tc.is_correct = 1 AND t.task_type = ?
        "#,
        params![user_id, task_type.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// Which ids of a task set has the user correctly completed?
///
/// Set containment, not a count: duplicate ids in the requirement must not
/// satisfy it.
pub fn completed_ids_in_set(
    conn: &Connection,
    user_id: &str,
    task_ids: &[String],
) -> Result<HashSet<String>, CoreError> {
    if task_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders: Vec<_> = task_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT DISTINCT task_id FROM task_completions
         WHERE user_id = ? AND is_correct = 1 AND task_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];
    for id in task_ids {
        sql_params.push(Box::new(id.clone()));
    }
    let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();

    let ids = stmt
        .query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(ids)
}

/// Correctly-completed published tasks in a category for a user
pub fn count_correct_in_category(
    conn: &Connection,
    user_id: &str,
    category: &str,
) -> Result<i64, CoreError> {
    conn.query_row(
        r#"
        SELECT COUNT(DISTINCT tc.task_id)
        FROM task_completions tc
        INNER JOIN tasks t ON t.id = tc.task_id
        WHERE tc.user_id = ? AND tc.is_correct = 1
          AND t.category = ? AND t.is_published = 1
        "#,
        params![user_id, category],
        |row| row.get(0),
    )
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// Total correct completions for a user (EP recomputation)
pub fn count_correct_for_user(conn: &Connection, user_id: &str) -> Result<i64, CoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM task_completions WHERE user_id = ? AND is_correct = 1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// Distinct categories the user has completed tasks in
pub fn categories_for_user(conn: &Connection, user_id: &str) -> Result<Vec<String>, CoreError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT DISTINCT t.category
            FROM task_completions tc
            INNER JOIN tasks t ON t.id = tc.task_id
            WHERE tc.user_id = ? AND tc.is_correct = 1
            ORDER BY t.category
            "#,
        )
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let categories = stmt
        .query_map(params![user_id], |row| row.get(0))
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(categories)
}
