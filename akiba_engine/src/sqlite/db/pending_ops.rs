use akiba_common::Cents;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CorrelationId, NewPendingOperation, OperationKind, OperationStatus, PendingOperation},
    traits::StoreError,
};

/// Inserts the pending operation. The partial unique index on `(correlation_id) WHERE status = 'Pending'` enforces
/// the one-active-entry-per-correlation-id invariant; a violation maps to `DuplicateCorrelation`.
pub async fn insert(op: NewPendingOperation, conn: &mut SqliteConnection) -> Result<PendingOperation, StoreError> {
    let cid = op.correlation_id.clone();
    let pending = sqlx::query_as(
        r#"
            INSERT INTO pending_operations (correlation_id, kind, user_id, amount, target, goal_id, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(op.correlation_id)
    .bind(op.kind.to_string())
    .bind(op.user_id)
    .bind(op.amount)
    .bind(op.target)
    .bind(op.goal_id)
    .bind(op.expires_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => StoreError::DuplicateCorrelation(cid),
        _ => StoreError::from(e),
    })?;
    Ok(pending)
}

/// Returns the most recent entry for the correlation id. Terminal entries are retained, so a correlation id that
/// was re-used resolves to the latest row.
pub async fn fetch_by_correlation(
    cid: &CorrelationId,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingOperation>, sqlx::Error> {
    let op = sqlx::query_as("SELECT * FROM pending_operations WHERE correlation_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(cid.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(op)
}

/// Re-keys a still-pending entry to the provider-assigned correlation id.
pub async fn reassign_correlation(
    current: &CorrelationId,
    assigned: &CorrelationId,
    conn: &mut SqliteConnection,
) -> Result<PendingOperation, StoreError> {
    let op: Option<PendingOperation> = sqlx::query_as(
        r#"
            UPDATE pending_operations SET correlation_id = $1, updated_at = CURRENT_TIMESTAMP
            WHERE correlation_id = $2 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(assigned.as_str())
    .bind(current.as_str())
    .fetch_optional(conn)
    .await?;
    op.ok_or_else(|| StoreError::OperationNotFound(current.clone()))
}

/// Transitions the entry to the given terminal status, but only if it is still pending. Returns `None` when no
/// pending row was transitioned (the caller distinguishes "already terminal" from "does not exist").
pub async fn transition(
    cid: &CorrelationId,
    to: OperationStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingOperation>, StoreError> {
    debug_assert!(to.is_terminal());
    let op: Option<PendingOperation> = sqlx::query_as(
        r#"
            UPDATE pending_operations SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE correlation_id = $2 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(to.to_string())
    .bind(cid.as_str())
    .fetch_optional(conn)
    .await?;
    if let Some(op) = &op {
        debug!("⏳️ Pending operation [{}] transitioned to {to}", op.correlation_id);
    }
    Ok(op)
}

/// Finds the oldest still-pending operation that the given confirmation can settle: same target, same kind, and an
/// amount within `tolerance` of the confirmed amount.
pub async fn find_match(
    target: &str,
    kind: OperationKind,
    amount: Cents,
    tolerance: Cents,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingOperation>, sqlx::Error> {
    let op = sqlx::query_as(
        r#"
            SELECT * FROM pending_operations
            WHERE target = $1 AND kind = $2 AND status = 'Pending' AND abs(amount - $3) <= $4
            ORDER BY created_at ASC
            LIMIT 1;
        "#,
    )
    .bind(target)
    .bind(kind.to_string())
    .bind(amount.value())
    .bind(tolerance.value())
    .fetch_optional(conn)
    .await?;
    Ok(op)
}

/// Atomically expires every pending entry whose deadline has passed, returning the expired rows. A single
/// `UPDATE .. RETURNING` statement guarantees at-most-once processing per entry even under concurrent sweepers.
pub async fn expire_overdue(conn: &mut SqliteConnection) -> Result<Vec<PendingOperation>, StoreError> {
    let rows = sqlx::query_as(
        r#"
            UPDATE pending_operations SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'Pending' AND unixepoch(expires_at) <= unixepoch(CURRENT_TIMESTAMP)
            RETURNING *;
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn fetch_pending_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PendingOperation>, sqlx::Error> {
    let ops = sqlx::query_as(
        "SELECT * FROM pending_operations WHERE user_id = $1 AND status = 'Pending' ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(ops)
}
