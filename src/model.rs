//! Domain types shared across the core
//!
//! Trigger conditions are decoded into a strongly-typed sum type once when
//! definitions are loaded, never re-parsed per evaluation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Kind of task a user can complete at a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Physical presence proven by QR scan or GPS fix
    Checkin,
    /// Answer a question about the location
    Quiz,
    /// Confirm a count of observable items
    CountConfirm,
    /// Match an observation prompt (photo/description)
    ObservationMatch,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Checkin => "checkin",
            TaskType::Quiz => "quiz",
            TaskType::CountConfirm => "count_confirm",
            TaskType::ObservationMatch => "observation_match",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "checkin" => Ok(TaskType::Checkin),
            "quiz" => Ok(TaskType::Quiz),
            "count_confirm" => Ok(TaskType::CountConfirm),
            "observation_match" => Ok(TaskType::ObservationMatch),
            other => Err(CoreError::InvalidInput(format!(
                "Unknown task type: {}",
                other
            ))),
        }
    }
}

/// Proof submitted with a check-in attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Proof {
    Qr {
        token: String,
    },
    Gps {
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
    },
}

/// Reward rarity, mapped to an XP amount by policy config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "common" => Ok(Rarity::Common),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            other => Err(CoreError::InvalidInput(format!("Unknown rarity: {}", other))),
        }
    }
}

/// What kind of cosmetic/achievement a reward grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Badge,
    Title,
    Cosmetic,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Badge => "badge",
            RewardKind::Title => "title",
            RewardKind::Cosmetic => "cosmetic",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "badge" => Ok(RewardKind::Badge),
            "title" => Ok(RewardKind::Title),
            "cosmetic" => Ok(RewardKind::Cosmetic),
            other => Err(CoreError::InvalidInput(format!(
                "Unknown reward kind: {}",
                other
            ))),
        }
    }
}

/// Category completion tier. Latch booleans on `CategoryProgress` are one-way:
/// once a tier unlocks it never resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            other => Err(CoreError::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}

/// Trigger type discriminants as stored in the `reward_definitions` table
pub mod trigger_types {
    pub const TASK_TYPE_COMPLETION: &str = "task_type_completion";
    pub const TASK_SET_COMPLETION: &str = "task_set_completion";
    pub const CATEGORY_TIER: &str = "category_tier";
}

/// Structured trigger predicate, one variant per trigger kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// N distinct correct completions of a given task type
    TaskTypeCompletion {
        task_type: TaskType,
        required_count: u32,
    },
    /// Every task in an explicit id set completed
    TaskSetCompletion { task_ids: Vec<String> },
    /// Category completion percentage crossed a tier threshold
    CategoryTier { category: String, tier: Tier },
}

#[derive(Deserialize)]
struct TaskTypePayload {
    task_type: TaskType,
    required_count: u32,
}

#[derive(Deserialize)]
struct TaskSetPayload {
    task_ids: Vec<String>,
}

#[derive(Deserialize)]
struct CategoryTierPayload {
    category: String,
    tier: Tier,
}

impl TriggerCondition {
    /// Decode a stored (trigger_type, condition_json) pair.
    ///
    /// Rejects malformed payloads at load time so evaluation never sees a
    /// half-parsed condition.
    pub fn decode(trigger_type: &str, condition_json: &str) -> Result<Self, CoreError> {
        match trigger_type {
            trigger_types::TASK_TYPE_COMPLETION => {
                let p: TaskTypePayload = serde_json::from_str(condition_json).map_err(|e| {
                    CoreError::InvalidInput(format!("Bad task_type_completion condition: {}", e))
                })?;
                if p.required_count == 0 {
                    return Err(CoreError::InvalidInput(
                        "task_type_completion requires required_count >= 1".to_string(),
                    ));
                }
                Ok(TriggerCondition::TaskTypeCompletion {
                    task_type: p.task_type,
                    required_count: p.required_count,
                })
            }
            trigger_types::TASK_SET_COMPLETION => {
                let p: TaskSetPayload = serde_json::from_str(condition_json).map_err(|e| {
                    CoreError::InvalidInput(format!("Bad task_set_completion condition: {}", e))
                })?;
                if p.task_ids.is_empty() {
                    return Err(CoreError::InvalidInput(
                        "task_set_completion requires a non-empty task id set".to_string(),
                    ));
                }
                Ok(TriggerCondition::TaskSetCompletion {
                    task_ids: p.task_ids,
                })
            }
            trigger_types::CATEGORY_TIER => {
                let p: CategoryTierPayload = serde_json::from_str(condition_json).map_err(|e| {
                    CoreError::InvalidInput(format!("Bad category_tier condition: {}", e))
                })?;
                Ok(TriggerCondition::CategoryTier {
                    category: p.category,
                    tier: p.tier,
                })
            }
            other => Err(CoreError::InvalidInput(format!(
                "Unknown trigger type: {}",
                other
            ))),
        }
    }

    /// Discriminant string as stored in the database
    pub fn trigger_type(&self) -> &'static str {
        match self {
            TriggerCondition::TaskTypeCompletion { .. } => trigger_types::TASK_TYPE_COMPLETION,
            TriggerCondition::TaskSetCompletion { .. } => trigger_types::TASK_SET_COMPLETION,
            TriggerCondition::CategoryTier { .. } => trigger_types::CATEGORY_TIER,
        }
    }

    /// Serialize the condition payload for storage
    pub fn to_condition_json(&self) -> Result<String, CoreError> {
        let value = match self {
            TriggerCondition::TaskTypeCompletion {
                task_type,
                required_count,
            } => serde_json::json!({
                "task_type": task_type,
                "required_count": required_count,
            }),
            TriggerCondition::TaskSetCompletion { task_ids } => serde_json::json!({
                "task_ids": task_ids,
            }),
            TriggerCondition::CategoryTier { category, tier } => serde_json::json!({
                "category": category,
                "tier": tier,
            }),
        };
        serde_json::to_string(&value)
            .map_err(|e| CoreError::InvalidInput(format!("Condition encode failed: {}", e)))
    }
}
