//! Waymark - completion-to-reward core for a gamified location-visiting
//! platform
//!
//! Users complete location tasks (QR scan, GPS check-in, quiz) and this core
//! durably, exactly-once, converts completions into XP, EP, badges, titles,
//! cosmetics, tier unlocks, and leaderboard movement.
//!
//! ## Pipeline
//!
//! ```text
//! POST /checkins
//!   └─ verify      proof vs task geofence/QR secret (pure)
//!   └─ record      task_completions, UNIQUE (user_id, task_id)
//!   └─ evaluate    which active reward definitions newly qualify
//!   └─ award       user_rewards insert + XP credit + tier latch, atomic
//!   └─ progress    derived stats, level, leaderboard rank
//! ```
//!
//! Exactly-once is anchored on two uniqueness constraints -
//! `task_completions (user_id, task_id)` and `user_rewards
//! (user_id, reward_id)` - so retries, double-taps, and reconciliation
//! re-runs all collapse to no-ops.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod geo;
pub mod model;
pub mod verify;

// Re-exports
pub use config::Config;
pub use db::Db;
pub use engine::{CheckinOutcome, Engine, ReconcileReport};
pub use error::CoreError;
pub use model::{Proof, Rarity, RewardKind, TaskType, Tier, TriggerCondition};
pub use verify::{FailureReason, VerificationResult};
