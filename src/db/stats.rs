//! Derived user aggregates and the leaderboard read path
//!
//! `user_stats` and `category_progress` are caches over the completion and
//! reward ledgers; every write here recomputes or monotonically advances,
//! never hand-edits. Leaderboard rank is computed by ordering at read time.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Per-user aggregate row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatsRow {
    pub user_id: String,
    pub total_xp: i64,
    pub total_ep: i64,
    pub current_level: i64,
    pub total_badges: i64,
    pub total_titles: i64,
    pub updated_at: String,
}

impl UserStatsRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            total_xp: row.get("total_xp")?,
            total_ep: row.get("total_ep")?,
            current_level: row.get("current_level")?,
            total_badges: row.get("total_badges")?,
            total_titles: row.get("total_titles")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Fresh stats for a user the ledger has not seen yet
    pub fn empty(user_id: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            total_ep: 0,
            current_level: 1,
            total_badges: 0,
            total_titles: 0,
            updated_at: now.to_string(),
        }
    }
}

/// Get stats for a user
pub fn get_user_stats(conn: &Connection, user_id: &str) -> Result<Option<UserStatsRow>, CoreError> {
    conn.query_row(
        "SELECT * FROM user_stats WHERE user_id = ?",
        params![user_id],
        UserStatsRow::from_row,
    )
    .optional()
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// Write a recomputed stats row (insert or replace-by-recomputation)
pub fn put_user_stats(conn: &Connection, stats: &UserStatsRow) -> Result<(), CoreError> {
    conn.execute(
        r#"
        INSERT INTO user_stats (
            user_id, total_xp, total_ep, current_level,
            total_badges, total_titles, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            total_xp = excluded.total_xp,
            total_ep = excluded.total_ep,
            current_level = excluded.current_level,
            total_badges = excluded.total_badges,
            total_titles = excluded.total_titles,
            updated_at = excluded.updated_at
        "#,
        params![
            stats.user_id,
            stats.total_xp,
            stats.total_ep,
            stats.current_level,
            stats.total_badges,
            stats.total_titles,
            stats.updated_at,
        ],
    )
    .map_err(|e| CoreError::Storage(format!("Upsert failed: {}", e)))?;
    Ok(())
}

/// Per-category progress row with one-way tier latches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryProgressRow {
    pub user_id: String,
    pub category: String,
    pub completed_count: i64,
    pub total_count: i64,
    pub completion_percentage: f64,
    pub bronze_unlocked: bool,
    pub silver_unlocked: bool,
    pub gold_unlocked: bool,
    pub updated_at: String,
}

impl CategoryProgressRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            category: row.get("category")?,
            completed_count: row.get("completed_count")?,
            total_count: row.get("total_count")?,
            completion_percentage: row.get("completion_percentage")?,
            bronze_unlocked: row.get::<_, i64>("bronze_unlocked")? != 0,
            silver_unlocked: row.get::<_, i64>("silver_unlocked")? != 0,
            gold_unlocked: row.get::<_, i64>("gold_unlocked")? != 0,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Get progress for one (user, category)
pub fn get_category_progress(
    conn: &Connection,
    user_id: &str,
    category: &str,
) -> Result<Option<CategoryProgressRow>, CoreError> {
    conn.query_row(
        "SELECT * FROM category_progress WHERE user_id = ? AND category = ?",
        params![user_id, category],
        CategoryProgressRow::from_row,
    )
    .optional()
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}

/// All category progress rows for a user
pub fn list_category_progress(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<CategoryProgressRow>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM category_progress WHERE user_id = ? ORDER BY category")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], CategoryProgressRow::from_row)
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Upsert recomputed category progress.
///
/// Counts and percentage are replaced by the recomputation; tier latches only
/// advance (MAX against the stored value), so a recomputation that would
/// lower the percentage can never un-unlock a tier.
pub fn upsert_category_progress(
    conn: &Connection,
    progress: &CategoryProgressRow,
) -> Result<(), CoreError> {
    conn.execute(
        r#"
        INSERT INTO category_progress (
            user_id, category, completed_count, total_count,
            completion_percentage, bronze_unlocked, silver_unlocked,
            gold_unlocked, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, category) DO UPDATE SET
            completed_count = excluded.completed_count,
            total_count = excluded.total_count,
            completion_percentage = excluded.completion_percentage,
            bronze_unlocked = MAX(category_progress.bronze_unlocked, excluded.bronze_unlocked),
            silver_unlocked = MAX(category_progress.silver_unlocked, excluded.silver_unlocked),
            gold_unlocked = MAX(category_progress.gold_unlocked, excluded.gold_unlocked),
            updated_at = excluded.updated_at
        "#,
        params![
            progress.user_id,
            progress.category,
            progress.completed_count,
            progress.total_count,
            progress.completion_percentage,
            progress.bronze_unlocked as i64,
            progress.silver_unlocked as i64,
            progress.gold_unlocked as i64,
            progress.updated_at,
        ],
    )
    .map_err(|e| CoreError::Storage(format!("Upsert failed: {}", e)))?;
    Ok(())
}

/// One leaderboard position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: String,
    pub total_xp: i64,
    pub current_level: i64,
}

/// Top-N users by XP, ties broken by ascending user id
pub fn leaderboard_top(conn: &Connection, limit: u32) -> Result<Vec<LeaderboardEntry>, CoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, total_xp, current_level FROM user_stats
             ORDER BY total_xp DESC, user_id ASC LIMIT ?",
        )
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, total_xp, current_level))| LeaderboardEntry {
            rank: i as i64 + 1,
            user_id,
            total_xp,
            current_level,
        })
        .collect())
}

/// 1-based rank of one user: everyone with more XP, plus earlier-id ties,
/// counts ahead of them
pub fn leaderboard_rank(conn: &Connection, user_id: &str) -> Result<Option<i64>, CoreError> {
    let stats = get_user_stats(conn, user_id)?;
    let Some(stats) = stats else {
        return Ok(None);
    };

    let ahead: i64 = conn
        .query_row(
            r#"
            SELECT COUNT(*) FROM user_stats
            WHERE total_xp > ?1 OR (total_xp = ?1 AND user_id < ?2)
            "#,
            params![stats.total_xp, user_id],
            |row| row.get(0),
        )
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?;

    Ok(Some(ahead + 1))
}
