//! Error types for the waymark core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("GPS accuracy {accuracy_m:.0}m exceeds allowed maximum {max_m:.0}m")]
    InsufficientAccuracy { accuracy_m: f64, max_m: f64 },

    #[error("Out of range: {distance_m:.1}m from target, allowed {allowed_m:.1}m")]
    OutOfRange { distance_m: f64, allowed_m: f64 },

    #[error("Proof does not match task type: {0}")]
    TypeMismatch(String),

    #[error("Task {task_id} already completed by {user_id}")]
    AlreadyCompleted { user_id: String, task_id: String },

    #[error("Reward {reward_id} already awarded to {user_id}")]
    AlreadyAwarded { user_id: String, reward_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// All database failures surface here. Every write in the core is
    /// idempotent, so callers may retry on this variant.
    #[error("Transient storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Idempotency signals are benign no-ops for internal callers.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            CoreError::AlreadyCompleted { .. } | CoreError::AlreadyAwarded { .. }
        )
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}
