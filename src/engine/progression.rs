//! Progression ledger
//!
//! Owns every mutation of `user_stats` and `category_progress`. Level and
//! badge/title counts are always recomputed from their source ledgers, never
//! incremented independently, so they cannot drift.

use chrono::Utc;
use rusqlite::Connection;

use crate::config::PolicyConfig;
use crate::db::completions;
use crate::db::rewards;
use crate::db::stats::{self, CategoryProgressRow, UserStatsRow};
use crate::db::tasks;
use crate::error::CoreError;
use crate::model::{RewardKind, Tier};

/// Level as a monotonic step function of total XP
pub fn level_for_xp(policy: &PolicyConfig, total_xp: i64) -> i64 {
    1 + total_xp.max(0) / policy.level_base_xp
}

/// Credit XP to a user and refresh every derived field.
///
/// Runs inside the caller's award transaction.
pub fn apply_xp(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    delta: i64,
    now: &str,
) -> Result<UserStatsRow, CoreError> {
    let mut user_stats = stats::get_user_stats(conn, user_id)?
        .unwrap_or_else(|| UserStatsRow::empty(user_id, now));

    user_stats.total_xp += delta;
    user_stats.current_level = level_for_xp(policy, user_stats.total_xp);
    user_stats.total_badges = rewards::count_by_kind(conn, user_id, RewardKind::Badge)?;
    user_stats.total_titles = rewards::count_by_kind(conn, user_id, RewardKind::Title)?;
    user_stats.updated_at = now.to_string();

    stats::put_user_stats(conn, &user_stats)?;
    Ok(user_stats)
}

/// Credit EP for a newly recorded completion and refresh the category
/// progress row for the completed task's category.
pub fn credit_completion(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    category: &str,
) -> Result<(), CoreError> {
    let now = Utc::now().to_rfc3339();

    let mut user_stats = stats::get_user_stats(conn, user_id)?
        .unwrap_or_else(|| UserStatsRow::empty(user_id, &now));
    user_stats.total_ep += policy.ep_per_completion;
    user_stats.updated_at = now.clone();
    stats::put_user_stats(conn, &user_stats)?;

    recompute_category(conn, user_id, category, &now)?;
    Ok(())
}

/// Recompute one category progress row from the completion ledger.
///
/// Counts and percentage are replaced; latches survive via the upsert's MAX
/// semantics.
pub fn recompute_category(
    conn: &Connection,
    user_id: &str,
    category: &str,
    now: &str,
) -> Result<CategoryProgressRow, CoreError> {
    let total = tasks::count_in_category(conn, category)?;
    let completed = completions::count_correct_in_category(conn, user_id, category)?;
    let percentage = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let existing = stats::get_category_progress(conn, user_id, category)?;

    let progress = CategoryProgressRow {
        user_id: user_id.to_string(),
        category: category.to_string(),
        completed_count: completed,
        total_count: total,
        completion_percentage: percentage,
        bronze_unlocked: existing.as_ref().map(|p| p.bronze_unlocked).unwrap_or(false),
        silver_unlocked: existing.as_ref().map(|p| p.silver_unlocked).unwrap_or(false),
        gold_unlocked: existing.as_ref().map(|p| p.gold_unlocked).unwrap_or(false),
        updated_at: now.to_string(),
    };

    stats::upsert_category_progress(conn, &progress)?;
    Ok(progress)
}

/// Flip a one-way tier latch as part of an award transaction
pub fn unlock_tier(
    conn: &Connection,
    user_id: &str,
    category: &str,
    tier: Tier,
    now: &str,
) -> Result<(), CoreError> {
    let mut progress = recompute_category(conn, user_id, category, now)?;
    match tier {
        Tier::Bronze => progress.bronze_unlocked = true,
        Tier::Silver => progress.silver_unlocked = true,
        Tier::Gold => progress.gold_unlocked = true,
    }
    stats::upsert_category_progress(conn, &progress)
}

/// Full recomputation of a user's stats from the underlying ledgers.
///
/// Used by reconciliation to repair drift: XP from the rarity of every held
/// reward, EP from the completion count, counts and level derived.
pub fn recompute_user_stats(
    conn: &Connection,
    policy: &PolicyConfig,
    user_id: &str,
    now: &str,
) -> Result<UserStatsRow, CoreError> {
    let held = rewards::list_for_user(conn, user_id)?;
    let total_xp: i64 = held
        .iter()
        .map(|r| policy.rarity_xp.xp_for(r.rarity))
        .sum();
    let completions_count = completions::count_correct_for_user(conn, user_id)?;

    let user_stats = UserStatsRow {
        user_id: user_id.to_string(),
        total_xp,
        total_ep: completions_count * policy.ep_per_completion,
        current_level: level_for_xp(policy, total_xp),
        total_badges: rewards::count_by_kind(conn, user_id, RewardKind::Badge)?,
        total_titles: rewards::count_by_kind(conn, user_id, RewardKind::Title)?,
        updated_at: now.to_string(),
    };

    stats::put_user_stats(conn, &user_stats)?;
    Ok(user_stats)
}
