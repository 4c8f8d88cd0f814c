//! The completion → trigger → reward pipeline
//!
//! `Engine::check_in` runs the full sequence for one attempt:
//! verify → record completion → evaluate triggers → award → refresh stats.
//! Everything after verification happens inside a single transaction, so a
//! client that gives up mid-request can never observe a completion without
//! its awards or an award without its XP.

pub mod awards;
pub mod progression;
pub mod reconcile;
pub mod triggers;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::completions::{self, CompletionRow, ProofMeta};
use crate::db::stats::{self, CategoryProgressRow, UserStatsRow};
use crate::db::tasks::{self, TaskRow};
use crate::db::Db;
use crate::error::CoreError;
use crate::model::Proof;
use crate::verify::{verify, FailureReason, VerificationResult};

pub use awards::{AwardOutcome, AwardSource};
pub use reconcile::ReconcileReport;

/// Pipeline entry point shared across request workers
pub struct Engine {
    db: Arc<Db>,
    config: Config,
}

/// Everything a client needs for the post-check-in celebration screen
#[derive(Debug, Serialize)]
pub struct CheckinOutcome {
    pub verification: VerificationResult,
    pub completion: CompletionRow,
    pub granted: Vec<AwardOutcome>,
    pub stats: UserStatsRow,
}

/// Read-path snapshot for `GET /users/{id}/stats`
#[derive(Debug, Serialize)]
pub struct UserSnapshot {
    pub stats: UserStatsRow,
    pub categories: Vec<CategoryProgressRow>,
    pub rank: Option<i64>,
}

impl Engine {
    pub fn new(db: Arc<Db>, config: Config) -> Self {
        Self { db, config }
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    /// Process one check-in attempt end to end.
    ///
    /// Verification failures surface as the typed errors of the taxonomy
    /// (`OutOfRange` carries the measured distance so clients can say "you
    /// were N meters away"); `AlreadyCompleted` signals the attempt was
    /// already done.
    pub fn check_in(
        &self,
        user_id: &str,
        task_id: &str,
        proof: &Proof,
    ) -> Result<CheckinOutcome, CoreError> {
        let policy = &self.config.policy;

        let task = self
            .db
            .with_conn(|conn| tasks::get_task(conn, task_id))?
            .filter(|t| t.is_published)
            .ok_or_else(|| CoreError::NotFound(format!("task {}", task_id)))?;

        let verification = verify(&task, proof, policy.max_accuracy_m);
        if !verification.ok {
            debug!(
                user_id,
                task_id,
                reason = ?verification.reason,
                "Check-in verification failed"
            );
            return Err(verification_error(&verification, &task, policy.max_accuracy_m));
        }

        let meta = ProofMeta {
            distance_m: verification.distance_m,
            accuracy_m: verification.accuracy_m,
            qr_token: match proof {
                Proof::Qr { token } => Some(token.clone()),
                Proof::Gps { .. } => None,
            },
        };

        let (completion, granted, user_stats) = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| CoreError::Storage(format!("Transaction failed: {}", e)))?;

            let completion = completions::record_completion(&tx, user_id, task_id, &meta)?;

            progression::credit_completion(&tx, policy, user_id, &task.category)?;

            let qualifying = triggers::evaluate(&tx, policy, user_id, &completion, &task)?;

            let mut granted = vec![];
            for def in &qualifying {
                match awards::award(&tx, policy, user_id, def, AwardSource::Live) {
                    Ok(outcome) => granted.push(outcome),
                    // Lost a race with a concurrent evaluation; the reward
                    // exists, nothing to do
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => return Err(e),
                }
            }

            let user_stats = stats::get_user_stats(&tx, user_id)?
                .ok_or_else(|| CoreError::Storage("Stats missing after completion".to_string()))?;

            tx.commit()
                .map_err(|e| CoreError::Storage(format!("Commit failed: {}", e)))?;

            Ok((completion, granted, user_stats))
        })?;

        if !granted.is_empty() {
            info!(
                user_id,
                task_id,
                rewards = granted.len(),
                "Check-in granted rewards"
            );
        }

        Ok(CheckinOutcome {
            verification,
            completion,
            granted,
            stats: user_stats,
        })
    }

    /// Read path: stats + category progress + leaderboard position
    pub fn user_snapshot(&self, user_id: &str) -> Result<UserSnapshot, CoreError> {
        self.db.with_conn(|conn| {
            let user_stats = stats::get_user_stats(conn, user_id)?
                .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))?;
            let categories = stats::list_category_progress(conn, user_id)?;
            let rank = stats::leaderboard_rank(conn, user_id)?;
            Ok(UserSnapshot {
                stats: user_stats,
                categories,
                rank,
            })
        })
    }

    /// Top-N leaderboard
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<stats::LeaderboardEntry>, CoreError> {
        self.db.with_conn(|conn| stats::leaderboard_top(conn, limit))
    }

    /// Re-run qualification over the user's full history (repair tool)
    pub fn reconcile(&self, user_id: &str) -> Result<ReconcileReport, CoreError> {
        reconcile::reconcile(&self.db, &self.config, user_id)
    }
}

/// Map a failed verification to its typed error, carrying the measured
/// detail the client needs to retry intelligently
fn verification_error(
    verification: &VerificationResult,
    task: &TaskRow,
    max_accuracy_m: f64,
) -> CoreError {
    match verification.reason {
        Some(FailureReason::InsufficientAccuracy) => CoreError::InsufficientAccuracy {
            accuracy_m: verification.accuracy_m.unwrap_or(f64::NAN),
            max_m: max_accuracy_m,
        },
        Some(FailureReason::OutOfRange) => CoreError::OutOfRange {
            distance_m: verification.distance_m.unwrap_or(f64::NAN),
            allowed_m: task.allowed_radius_m.unwrap_or(0.0),
        },
        Some(FailureReason::TypeMismatch) => CoreError::TypeMismatch(format!(
            "task {} is of type {}",
            task.id,
            task.task_type.as_str()
        )),
        _ => CoreError::InvalidProof(format!("proof rejected for task {}", task.id)),
    }
}
