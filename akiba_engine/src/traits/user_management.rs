use thiserror::Error;

use crate::db_types::{User, WalletAddress};

/// User records and wallet-address bindings.
///
/// An on-chain address is bound to at most one user at any time. Proof of ownership (signature verification) is the
/// API layer's job; this trait only enforces the uniqueness invariant.
#[allow(async_fn_in_trait)]
pub trait UserManagement: Clone {
    async fn fetch_user(&self, user_id: i64) -> Result<User, UserStoreError>;

    async fn fetch_user_by_wallet(&self, address: &WalletAddress) -> Result<Option<User>, UserStoreError>;

    async fn create_user(&self, phone: &str) -> Result<User, UserStoreError>;

    /// Binds (or re-binds) the wallet address to the user. Fails with [`UserStoreError::AddressAlreadyBound`] if the
    /// address is bound to a different user.
    async fn bind_wallet(&self, user_id: i64, address: &WalletAddress) -> Result<User, UserStoreError>;

    /// Soft-deactivates the user. Users are never hard-deleted.
    async fn deactivate_user(&self, user_id: i64) -> Result<User, UserStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum UserStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
    #[error("Address {0} is already bound to another user")]
    AddressAlreadyBound(WalletAddress),
    #[error("A user already exists for phone {0}")]
    PhoneAlreadyRegistered(String),
}

impl From<sqlx::Error> for UserStoreError {
    fn from(e: sqlx::Error) -> Self {
        UserStoreError::DatabaseError(e.to_string())
    }
}
