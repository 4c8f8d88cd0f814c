//! Reconciliation: batch re-run of qualification over a user's full history
//!
//! Repair tool for when trigger rules change or a bug dropped awards. Leans
//! entirely on the idempotency of the award path, so running it any number
//! of times is safe; the second consecutive run awards nothing.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::db::{completions, rewards, Db};
use crate::engine::awards::{self, AwardSource};
use crate::engine::progression;
use crate::engine::triggers;
use crate::error::CoreError;

/// What a reconciliation run did
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub user_id: String,
    /// Rewards newly granted by this run
    pub awarded: Vec<String>,
    /// Rewards skipped because the user already held them
    pub skipped: Vec<String>,
}

/// Re-evaluate every active definition against the user's full completion
/// history, awarding whatever newly qualifies, then recompute derived stats.
pub fn reconcile(db: &Arc<Db>, config: &Config, user_id: &str) -> Result<ReconcileReport, CoreError> {
    let policy = &config.policy;
    let user = user_id.to_string();

    let report = db.with_conn_mut(|conn| {
        let tx = conn
            .transaction()
            .map_err(|e| CoreError::Storage(format!("Transaction failed: {}", e)))?;

        let now = Utc::now().to_rfc3339();

        let held = rewards::awarded_ids_for_user(&tx, &user)?;
        if held.is_empty() && completions::count_correct_for_user(&tx, &user)? == 0 {
            return Err(CoreError::NotFound(format!("user {}", user)));
        }

        // Refresh category progress first so tier checks see current counts
        for category in completions::categories_for_user(&tx, &user)? {
            progression::recompute_category(&tx, &user, &category, &now)?;
        }

        let definitions = rewards::load_active_definitions(&tx)?;

        let mut awarded = vec![];
        let mut skipped = vec![];

        for def in &definitions {
            if held.contains(&def.id) {
                skipped.push(def.id.clone());
                continue;
            }
            if !triggers::qualifies(&tx, policy, &user, def)? {
                continue;
            }
            match awards::award(&tx, policy, &user, def, AwardSource::Reconcile) {
                Ok(outcome) => awarded.push(outcome.reward_id),
                Err(e) if e.is_duplicate() => skipped.push(def.id.clone()),
                Err(e) => return Err(e),
            }
        }

        // Repair any drift in the derived aggregates while we are here
        progression::recompute_user_stats(&tx, policy, &user, &now)?;

        tx.commit()
            .map_err(|e| CoreError::Storage(format!("Commit failed: {}", e)))?;

        Ok(ReconcileReport {
            user_id: user.clone(),
            awarded,
            skipped,
        })
    })?;

    info!(
        user_id,
        awarded = report.awarded.len(),
        skipped = report.skipped.len(),
        "Reconciliation complete"
    );

    Ok(report)
}
