//! Database schema definitions
//!
//! Schema version is checked exactly once, when the connection is opened.
//! Request paths never probe for table existence.

use rusqlite::Connection;
use tracing::info;

use crate::error::CoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(CoreError::Storage(format!(
            "Database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, CoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| CoreError::Storage(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CoreError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| CoreError::Storage(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| CoreError::Storage(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| CoreError::Storage(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(LEDGER_SCHEMA)
        .map_err(|e| CoreError::Storage(format!("Failed to create ledger tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| CoreError::Storage(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), CoreError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Read-only catalogs: tasks and reward definitions
const CATALOG_SCHEMA: &str = r#"
-- Location task catalog. Immutable once published.
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    task_type TEXT NOT NULL,
    category TEXT NOT NULL,

    -- Check-in proof config
    latitude REAL,
    longitude REAL,
    allowed_radius_m REAL,
    qr_secret TEXT,

    is_published INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Admin-curated trigger rules. Condition payload is decoded into a typed
-- sum over the three trigger kinds at load time.
CREATE TABLE IF NOT EXISTS reward_definitions (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    condition_json TEXT NOT NULL,
    rarity TEXT NOT NULL DEFAULT 'common',
    reward_kind TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Write-side ledger tables
const LEDGER_SCHEMA: &str = r#"
-- One row per (user, task), created once, never updated.
CREATE TABLE IF NOT EXISTS task_completions (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    is_correct INTEGER NOT NULL DEFAULT 1,
    completed_at TEXT NOT NULL,

    -- Proof metadata
    distance_m REAL,
    accuracy_m REAL,
    qr_token TEXT,

    UNIQUE (user_id, task_id)
);

-- The idempotency anchor: at most one row per (user, reward).
CREATE TABLE IF NOT EXISTS user_rewards (
    user_id TEXT NOT NULL,
    reward_id TEXT NOT NULL,
    reward_kind TEXT NOT NULL,
    rarity TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'live',
    earned_at TEXT NOT NULL,
    PRIMARY KEY (user_id, reward_id)
);

-- Derived per-user aggregates. Mutated only by the progression ledger.
CREATE TABLE IF NOT EXISTS user_stats (
    user_id TEXT PRIMARY KEY NOT NULL,
    total_xp INTEGER NOT NULL DEFAULT 0,
    total_ep INTEGER NOT NULL DEFAULT 0,
    current_level INTEGER NOT NULL DEFAULT 1,
    total_badges INTEGER NOT NULL DEFAULT 0,
    total_titles INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Tier latches are one-way: once 1, never back to 0.
CREATE TABLE IF NOT EXISTS category_progress (
    user_id TEXT NOT NULL,
    category TEXT NOT NULL,
    completed_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    completion_percentage REAL NOT NULL DEFAULT 0,
    bronze_unlocked INTEGER NOT NULL DEFAULT 0,
    silver_unlocked INTEGER NOT NULL DEFAULT 0,
    gold_unlocked INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, category)
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Task indexes
CREATE INDEX IF NOT EXISTS idx_tasks_type ON tasks(task_type);
CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category);

-- Completion indexes
CREATE INDEX IF NOT EXISTS idx_completions_user ON task_completions(user_id);
CREATE INDEX IF NOT EXISTS idx_completions_task ON task_completions(task_id);

-- Reward definition indexes
CREATE INDEX IF NOT EXISTS idx_reward_defs_trigger ON reward_definitions(trigger_type);
CREATE INDEX IF NOT EXISTS idx_reward_defs_active ON reward_definitions(is_active);

-- User reward indexes
CREATE INDEX IF NOT EXISTS idx_user_rewards_user ON user_rewards(user_id);

-- Leaderboard ordering
CREATE INDEX IF NOT EXISTS idx_user_stats_xp ON user_stats(total_xp DESC, user_id ASC);
"#;
