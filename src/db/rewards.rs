//! Reward definitions and the user reward ledger
//!
//! Definitions are decoded into `TriggerCondition` once at load; malformed
//! rows fail loudly instead of silently skipping evaluation. The
//! `user_rewards` primary key is the idempotency anchor for the whole
//! pipeline.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::decode_err;
use crate::error::CoreError;
use crate::model::{Rarity, RewardKind, TriggerCondition};

/// A reward definition with its condition decoded
#[derive(Debug, Clone, Serialize)]
pub struct RewardDefinition {
    pub id: String,
    pub name: String,
    pub condition: TriggerCondition,
    pub rarity: Rarity,
    pub reward_kind: RewardKind,
    pub is_active: bool,
    pub created_at: String,
}

impl RewardDefinition {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let trigger_type: String = row.get("trigger_type")?;
        let condition_json: String = row.get("condition_json")?;
        let rarity_str: String = row.get("rarity")?;
        let kind_str: String = row.get("reward_kind")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            condition: TriggerCondition::decode(&trigger_type, &condition_json)
                .map_err(decode_err)?,
            rarity: Rarity::parse(&rarity_str).map_err(decode_err)?,
            reward_kind: RewardKind::parse(&kind_str).map_err(decode_err)?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for seeding a reward definition
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRewardInput {
    pub id: String,
    pub name: String,
    pub trigger_type: String,
    pub condition: serde_json::Value,
    #[serde(default = "default_rarity")]
    pub rarity: Rarity,
    pub reward_kind: RewardKind,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_rarity() -> Rarity {
    Rarity::Common
}
fn default_active() -> bool {
    true
}

/// Load all active definitions, ordered by id for deterministic evaluation
pub fn load_active_definitions(conn: &Connection) -> Result<Vec<RewardDefinition>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM reward_definitions WHERE is_active = 1 ORDER BY id")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let defs = stmt
        .query_map([], RewardDefinition::from_row)
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Definition decode failed: {}", e)))?;

    Ok(defs)
}

/// Bulk seed reward definitions: insert new ids, skip existing ones.
///
/// Conditions are decoded up front so a bad payload rejects the item rather
/// than poisoning later evaluation.
pub fn bulk_create_definitions(
    conn: &mut Connection,
    items: Vec<CreateRewardInput>,
) -> Result<super::tasks::BulkResult, CoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| CoreError::Storage(format!("Transaction failed: {}", e)))?;

    let mut inserted = 0u64;
    let mut skipped = 0u64;
    let mut errors = vec![];

    for input in items {
        let condition_json = input.condition.to_string();
        if let Err(e) = TriggerCondition::decode(&input.trigger_type, &condition_json) {
            errors.push(format!("{}: {}", input.id, e));
            continue;
        }

        let result = tx.execute(
            r#"
            INSERT OR IGNORE INTO reward_definitions (
                id, name, trigger_type, condition_json, rarity, reward_kind, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                input.id,
                input.name,
                input.trigger_type,
                condition_json,
                input.rarity.as_str(),
                input.reward_kind.as_str(),
                input.is_active as i64,
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

    Ok(super::tasks::BulkResult {
        inserted,
        skipped,
        errors,
    })
}

/// A granted reward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRewardRow {
    pub user_id: String,
    pub reward_id: String,
    pub reward_kind: RewardKind,
    pub rarity: Rarity,
    pub source: String,
    pub earned_at: String,
}

impl UserRewardRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let kind_str: String = row.get("reward_kind")?;
        let rarity_str: String = row.get("rarity")?;
        Ok(Self {
            user_id: row.get("user_id")?,
            reward_id: row.get("reward_id")?,
            reward_kind: RewardKind::parse(&kind_str).map_err(decode_err)?,
            rarity: Rarity::parse(&rarity_str).map_err(decode_err)?,
            source: row.get("source")?,
            earned_at: row.get("earned_at")?,
        })
    }
}

/// Atomic insert-if-absent on the (user, reward) anchor.
///
/// Returns true when this call inserted the row, false when it already
/// existed (a benign no-op for the caller).
pub fn insert_user_reward(
    conn: &Connection,
    user_id: &str,
    reward_id: &str,
    reward_kind: RewardKind,
    rarity: Rarity,
    source: &str,
    earned_at: &str,
) -> Result<bool, CoreError> {
    let changed = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO user_rewards (
                user_id, reward_id, reward_kind, rarity, source, earned_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                reward_id,
                reward_kind.as_str(),
                rarity.as_str(),
                source,
                earned_at,
            ],
        )
        .map_err(|e| CoreError::Storage(format!("Insert failed: {}", e)))?;

    Ok(changed > 0)
}

/// Reward ids already granted to a user
pub fn awarded_ids_for_user(conn: &Connection, user_id: &str) -> Result<HashSet<String>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT reward_id FROM user_rewards WHERE user_id = ?")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(ids)
}

/// All rewards granted to a user, newest first
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<UserRewardRow>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM user_rewards WHERE user_id = ? ORDER BY earned_at DESC, reward_id")
        .map_err(|e| CoreError::Storage(format!("Prepare failed: {}", e)))?;

    let rewards = stmt
        .query_map(params![user_id], UserRewardRow::from_row)
        .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Storage(format!("Row parse failed: {}", e)))?;

    Ok(rewards)
}

/// Derived count of rewards of one kind (never an incremented counter)
pub fn count_by_kind(
    conn: &Connection,
    user_id: &str,
    kind: RewardKind,
) -> Result<i64, CoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM user_rewards WHERE user_id = ? AND reward_kind = ?",
        params![user_id, kind.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| CoreError::Storage(format!("Query failed: {}", e)))
}
