//! Reward awarding
//!
//! Grants one qualifying reward: the `user_rewards` insert, the XP credit,
//! and (for tier rewards) the latch flip are one atomic step. Callers run
//! this inside an open transaction; nothing here commits.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::config::PolicyConfig;
use crate::db::rewards::{self, RewardDefinition};
use crate::engine::progression;
use crate::error::CoreError;
use crate::model::{Rarity, RewardKind, TriggerCondition};

/// Where an award came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardSource {
    Live,
    Reconcile,
}

impl AwardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwardSource::Live => "live",
            AwardSource::Reconcile => "reconcile",
        }
    }
}

/// A freshly granted reward, as shown to the client
#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub reward_id: String,
    pub name: String,
    pub reward_kind: RewardKind,
    pub rarity: Rarity,
    pub xp_delta: i64,
}

/// Grant a qualifying reward exactly once.
///
/// The (user, reward) primary key arbitrates races: if another evaluation
/// got here first this returns `AlreadyAwarded` before touching XP, and the
/// caller treats it as a no-op. On the winning path the reward row, the XP
/// credit, and any tier latch all land in the caller's transaction together.
pub fn award(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    def: &RewardDefinition,
    source: AwardSource,
) -> Result<AwardOutcome, CoreError> {
    let now = Utc::now().to_rfc3339();

    let inserted = rewards::insert_user_reward(
        conn,
        user_id,
        &def.id,
        def.reward_kind,
        def.rarity,
        source.as_str(),
        &now,
    )?;

    if !inserted {
        return Err(CoreError::AlreadyAwarded {
            user_id: user_id.to_string(),
            reward_id: def.id.clone(),
        });
    }

    let xp_delta = policy.rarity_xp.xp_for(def.rarity);
    progression::apply_xp(conn, policy, user_id, xp_delta, &now)?;

    if let TriggerCondition::CategoryTier { category, tier } = &def.condition {
        progression::unlock_tier(conn, user_id, category, *tier, &now)?;
    }

    info!(
        user_id,
        reward_id = %def.id,
        rarity = def.rarity.as_str(),
        xp_delta,
        source = source.as_str(),
        "Reward granted"
    );

    Ok(AwardOutcome {
        reward_id: def.id.clone(),
        name: def.name.clone(),
        reward_kind: def.reward_kind,
        rarity: def.rarity,
        xp_delta,
    })
}
