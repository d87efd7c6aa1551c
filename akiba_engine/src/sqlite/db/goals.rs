use akiba_common::Cents;
use log::{debug, info};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Goal, GoalStatus, NewGoal},
    traits::StoreError,
};

pub async fn insert(goal: NewGoal, conn: &mut SqliteConnection) -> Result<Goal, StoreError> {
    let goal: Goal = sqlx::query_as(
        r#"
            INSERT INTO goals (user_id, name, target_amount, deadline, chain_goal_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(goal.user_id)
    .bind(goal.name)
    .bind(goal.target_amount)
    .bind(goal.deadline)
    .bind(goal.chain_goal_id)
    .fetch_one(conn)
    .await?;
    debug!("🎯️ Goal #{} ({}) created for user #{}", goal.id, goal.name, goal.user_id);
    Ok(goal)
}

pub async fn fetch(user_id: i64, goal_id: i64, conn: &mut SqliteConnection) -> Result<Option<Goal>, sqlx::Error> {
    let goal = sqlx::query_as("SELECT * FROM goals WHERE id = $1 AND user_id = $2")
        .bind(goal_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(goal)
}

pub async fn fetch_by_id(goal_id: i64, conn: &mut SqliteConnection) -> Result<Option<Goal>, sqlx::Error> {
    let goal = sqlx::query_as("SELECT * FROM goals WHERE id = $1").bind(goal_id).fetch_optional(conn).await?;
    Ok(goal)
}

pub async fn fetch_by_chain_id(chain_goal_id: i64, conn: &mut SqliteConnection) -> Result<Option<Goal>, sqlx::Error> {
    let goal =
        sqlx::query_as("SELECT * FROM goals WHERE chain_goal_id = $1").bind(chain_goal_id).fetch_optional(conn).await?;
    Ok(goal)
}

pub async fn fetch_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Goal>, sqlx::Error> {
    let goals =
        sqlx::query_as("SELECT * FROM goals WHERE user_id = $1 ORDER BY created_at ASC").bind(user_id).fetch_all(conn).await?;
    Ok(goals)
}

/// Applies a contribution to an active goal and evaluates the completion transition in the same statement batch.
///
/// The increment only applies while the goal is `Active`, which keeps `current_amount` monotonic: contributions
/// that settle after completion/cancellation leave the goal untouched (the balance still moves; the goal does not).
/// The `Active -> Completed` flip happens exactly at the contribution that first reaches the target, and
/// `completed_at` is stamped once.
pub async fn apply_contribution(goal_id: i64, amount: Cents, conn: &mut SqliteConnection) -> Result<Goal, StoreError> {
    let updated: Option<Goal> = sqlx::query_as(
        r#"
            UPDATE goals SET
                current_amount = current_amount + $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Active'
            RETURNING *;
        "#,
    )
    .bind(goal_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    let goal = match updated {
        Some(goal) => goal,
        // Not active (or missing): report the current state so the caller can log it, but never lose the row.
        None => return fetch_by_id(goal_id, conn).await?.ok_or(StoreError::GoalNotFound(goal_id)),
    };
    if !goal.is_reached() {
        return Ok(goal);
    }
    // normalization on completion: overshoot from provider rounding is clamped back to the target
    let completed: Option<Goal> = sqlx::query_as(
        r#"
            UPDATE goals SET
                status = 'Completed',
                current_amount = min(current_amount, target_amount),
                completed_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Active'
            RETURNING *;
        "#,
    )
    .bind(goal_id)
    .fetch_optional(conn)
    .await?;
    match completed {
        Some(goal) => {
            info!("🎯️ Goal #{} reached its target of {} and is now complete", goal.id, goal.target_amount);
            Ok(goal)
        },
        None => Ok(goal),
    }
}

/// Changes the goal lifecycle status for pause/resume/cancel requests.
///
/// | From \ To  | Active | Paused | Cancelled |
/// |-----------|--------|--------|-----------|
/// | Active    | Err    | ok     | ok        |
/// | Paused    | ok     | Err    | ok        |
/// | Cancelled | Err    | Err    | Err       |
/// | Completed | Err    | Err    | Err       |
///
/// `Completed` is never a valid target status here; that transition belongs to the settlement path alone.
pub async fn set_status(
    user_id: i64,
    goal_id: i64,
    new_status: GoalStatus,
    conn: &mut SqliteConnection,
) -> Result<Goal, StoreError> {
    if matches!(new_status, GoalStatus::Completed) {
        return Err(StoreError::GoalTransitionForbidden(
            "goals complete through settled contributions, not status changes".to_string(),
        ));
    }
    let goal = fetch(user_id, goal_id, &mut *conn).await?.ok_or(StoreError::GoalNotFound(goal_id))?;
    use GoalStatus::*;
    let allowed = matches!(
        (goal.status, new_status),
        (Active, Paused) | (Active, Cancelled) | (Paused, Active) | (Paused, Cancelled)
    );
    if !allowed {
        return Err(StoreError::GoalTransitionForbidden(format!("{} -> {new_status}", goal.status)));
    }
    let updated: Goal = sqlx::query_as(
        r#"
            UPDATE goals SET status = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND user_id = $2
            RETURNING *;
        "#,
    )
    .bind(goal_id)
    .bind(user_id)
    .bind(new_status.to_string())
    .fetch_one(conn)
    .await?;
    Ok(updated)
}
