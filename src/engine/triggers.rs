//! Trigger evaluation
//!
//! Decides which reward definitions newly qualify after a completion. Pure
//! with respect to already-awarded rewards: until an award is applied,
//! repeated evaluation over the same state returns the same set, so retries
//! are safe.

use rusqlite::Connection;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::db::completions::{self, CompletionRow};
use crate::db::rewards::{self, RewardDefinition};
use crate::db::stats;
use crate::db::tasks::{self, TaskRow};
use crate::error::CoreError;
use crate::model::{Tier, TriggerCondition};

/// Which definitions newly qualify for this completion event.
///
/// Only definitions relevant to the completed task are considered; rewards
/// the user already holds are skipped without further computation. Results
/// come back in definition-id order.
pub fn evaluate(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    completion: &CompletionRow,
    task: &TaskRow,
) -> Result<Vec<RewardDefinition>, CoreError> {
    let definitions = rewards::load_active_definitions(conn)?;
    let awarded = rewards::awarded_ids_for_user(conn, user_id)?;

    let mut qualifying = vec![];
    for def in definitions {
        if !is_relevant(&def.condition, completion, task) {
            continue;
        }
        if awarded.contains(&def.id) {
            continue;
        }
        if qualifies(conn, policy, user_id, &def)? {
            debug!(user_id, reward_id = %def.id, "Trigger qualified");
            qualifying.push(def);
        }
    }

    Ok(qualifying)
}

/// Could this completion event have changed the definition's qualification?
fn is_relevant(condition: &TriggerCondition, completion: &CompletionRow, task: &TaskRow) -> bool {
    match condition {
        TriggerCondition::TaskTypeCompletion { task_type, .. } => *task_type == task.task_type,
        TriggerCondition::TaskSetCompletion { task_ids } => task_ids.contains(&completion.task_id),
        TriggerCondition::CategoryTier { category, .. } => *category == task.category,
    }
}

/// Does the user's full completion history satisfy this definition?
///
/// Shared between live evaluation and reconciliation; reads only, never
/// writes.
pub fn qualifies(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    def: &RewardDefinition,
) -> Result<bool, CoreError> {
    match &def.condition {
        TriggerCondition::TaskTypeCompletion {
            task_type,
            required_count,
        } => {
            let count = completions::count_correct_by_type(conn, user_id, *task_type)?;
            Ok(count >= *required_count as i64)
        }
        TriggerCondition::TaskSetCompletion { task_ids } => {
            let completed = completions::completed_ids_in_set(conn, user_id, task_ids)?;
            Ok(task_ids.iter().all(|id| completed.contains(id)))
        }
        TriggerCondition::CategoryTier { category, tier } => {
            let total = tasks::count_in_category(conn, category)?;
            if total == 0 {
                return Ok(false);
            }
            let completed = completions::count_correct_in_category(conn, user_id, category)?;
            let percentage = completed as f64 / total as f64 * 100.0;

            if percentage < policy.tier_thresholds.threshold_for(*tier) {
                return Ok(false);
            }

            // The latch stops a tier from re-firing on every later
            // completion in the category
            let latched = stats::get_category_progress(conn, user_id, category)?
                .map(|p| match tier {
                    Tier::Bronze => p.bronze_unlocked,
                    Tier::Silver => p.silver_unlocked,
                    Tier::Gold => p.gold_unlocked,
                })
                .unwrap_or(false);

            Ok(!latched)
        }
    }
}
