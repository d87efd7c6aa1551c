use akiba_common::Cents;
use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::BalanceProjection, traits::StoreError};

/// Fetches the balance projection for the user, or a zero projection if no movement has settled yet.
pub async fn fetch(user_id: i64, conn: &mut SqliteConnection) -> Result<BalanceProjection, sqlx::Error> {
    let row: Option<BalanceProjection> =
        sqlx::query_as("SELECT * FROM balances WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(row.unwrap_or(BalanceProjection {
        user_id,
        balance: Cents::default(),
        total_deposited: Cents::default(),
        total_withdrawn: Cents::default(),
        updated_at: Utc::now(),
    }))
}

/// Applies a balance delta as one conditional atomic read-modify-write. The `balance + $2 >= 0` guard rejects any
/// delta that would drive the balance negative without a separate read, so concurrent deltas never race past the
/// zero floor. Returns the post-mutation projection, or `NegativeBalance`.
pub async fn apply_delta(
    user_id: i64,
    delta: Cents,
    conn: &mut SqliteConnection,
) -> Result<BalanceProjection, StoreError> {
    let d = delta.value();
    let deposited = d.max(0);
    let withdrawn = (-d).max(0);
    // make sure a projection row exists before the conditional update
    sqlx::query("INSERT INTO balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let updated: Option<BalanceProjection> = sqlx::query_as(
        r#"
            UPDATE balances SET
                balance = balance + $2,
                total_deposited = total_deposited + $3,
                total_withdrawn = total_withdrawn + $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1 AND balance + $2 >= 0
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(d)
    .bind(deposited)
    .bind(withdrawn)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(projection) => {
            trace!("💰️ Balance for user #{user_id} adjusted by {delta} to {}", projection.balance);
            Ok(projection)
        },
        None => {
            let current = fetch(user_id, conn).await?;
            Err(StoreError::NegativeBalance { user_id, balance: current.balance, delta })
        },
    }
}
