use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, TransactionRecord},
    traits::{Pagination, StoreError},
};

/// Inserts the transaction record. The partial unique index on `external_ref` is the idempotence guard: an insert
/// for an already-recorded on-chain event or provider receipt maps to `DuplicateExternalRef`.
pub async fn insert(tx: NewTransaction, conn: &mut SqliteConnection) -> Result<TransactionRecord, StoreError> {
    let external_ref = tx.external_ref.clone();
    let record: TransactionRecord = sqlx::query_as(
        r#"
            INSERT INTO transactions (user_id, kind, status, amount, external_ref, description, pending_op_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(tx.user_id)
    .bind(tx.kind.to_string())
    .bind(tx.status.to_string())
    .bind(tx.amount)
    .bind(tx.external_ref)
    .bind(tx.description)
    .bind(tx.pending_op_id)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            StoreError::DuplicateExternalRef(external_ref.unwrap_or_default())
        },
        _ => StoreError::from(e),
    })?;
    debug!("🗃️ Transaction #{} recorded: {} {} {}", record.id, record.kind, record.status, record.amount);
    Ok(record)
}

pub async fn fetch_by_external_ref(
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM transactions WHERE external_ref = $1")
        .bind(external_ref)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Settled and failed movements for the user, newest first.
pub async fn fetch_for_user(
    user_id: i64,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionRecord>, sqlx::Error> {
    let records = sqlx::query_as(
        r#"
            SELECT * FROM transactions WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3;
        "#,
    )
    .bind(user_id)
    .bind(i64::from(pagination.limit))
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok(records)
}
