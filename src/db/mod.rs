//! SQLite storage for the completion → reward pipeline
//!
//! ## Tables
//!
//! - `tasks` - location task catalog (read-only during evaluation)
//! - `task_completions` - system-of-record for "did X complete Y",
//!   UNIQUE (user_id, task_id)
//! - `reward_definitions` - admin-curated trigger rules
//! - `user_rewards` - the idempotency anchor, PK (user_id, reward_id)
//! - `user_stats` - derived per-user aggregates
//! - `category_progress` - per-category completion with one-way tier latches
//!
//! The two uniqueness constraints are the sole arbiters of first-writer-wins
//! for concurrent check-ins and reconciliation overlap.

pub mod completions;
pub mod rewards;
pub mod schema;
pub mod stats;
pub mod tasks;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CoreError;

/// SQLite database handle shared across request workers
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open or create the database under the given data directory
    pub fn open(data_dir: &Path) -> Result<Self, CoreError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| CoreError::Storage(format!("Failed to create data dir: {}", e)))?;
        let db_path = data_dir.join("waymark.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| CoreError::Storage(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers against the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CoreError::Storage(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Storage(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CoreError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Storage(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write (transaction-capable) against the connection
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Storage(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Table-count snapshot for the diagnostic endpoint
    pub fn stats(&self) -> Result<DbStats, CoreError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, CoreError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })
                    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                task_count: count("tasks")?,
                completion_count: count("task_completions")?,
                reward_definition_count: count("reward_definitions")?,
                user_reward_count: count("user_rewards")?,
                user_count: count("user_stats")?,
            })
        })
    }
}

/// Wrap a domain decode failure so it can surface from a rusqlite row mapper
pub(crate) fn decode_err(e: CoreError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub task_count: u64,
    pub completion_count: u64,
    pub reward_definition_count: u64,
    pub user_reward_count: u64,
    pub user_count: u64,
}

// Re-exports
pub use completions::{CompletionRow, ProofMeta};
pub use rewards::{RewardDefinition, UserRewardRow};
pub use stats::{CategoryProgressRow, LeaderboardEntry, UserStatsRow};
pub use tasks::{CreateTaskInput, TaskRow};
