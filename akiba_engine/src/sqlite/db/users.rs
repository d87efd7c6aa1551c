use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{User, WalletAddress},
    traits::UserStoreError,
};

pub async fn fetch(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

pub async fn fetch_by_wallet(
    address: &WalletAddress,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE wallet_address = $1")
        .bind(address.normalized())
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

pub async fn insert(phone: &str, conn: &mut SqliteConnection) -> Result<User, UserStoreError> {
    let user: User = sqlx::query_as("INSERT INTO users (phone) VALUES ($1) RETURNING *")
        .bind(phone)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(err) if err.is_unique_violation() => {
                UserStoreError::PhoneAlreadyRegistered(phone.to_string())
            },
            _ => UserStoreError::from(e),
        })?;
    debug!("🧑️ User #{} registered for phone {}", user.id, user.phone);
    Ok(user)
}

/// Binds the wallet address to the user. The partial unique index on `wallet_address` rejects a bind when the
/// address already belongs to a different user.
pub async fn bind_wallet(
    user_id: i64,
    address: &WalletAddress,
    conn: &mut SqliteConnection,
) -> Result<User, UserStoreError> {
    let normalized = address.normalized();
    let user: Option<User> = sqlx::query_as(
        "UPDATE users SET wallet_address = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .bind(&normalized)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            UserStoreError::AddressAlreadyBound(normalized.clone())
        },
        _ => UserStoreError::from(e),
    })?;
    let user = user.ok_or(UserStoreError::UserNotFound(user_id))?;
    debug!("🧑️ User #{} bound to wallet {}", user.id, normalized);
    Ok(user)
}

pub async fn deactivate(user_id: i64, conn: &mut SqliteConnection) -> Result<User, UserStoreError> {
    let user: Option<User> = sqlx::query_as(
        "UPDATE users SET active = FALSE, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    user.ok_or(UserStoreError::UserNotFound(user_id))
}
