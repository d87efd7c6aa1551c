use akiba_common::Cents;
use thiserror::Error;

use crate::{
    gateway::GatewayError,
    helpers::{PhoneError, WalletSignatureError},
    ledger::LedgerError,
    traits::{StoreError, UserStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    User(#[from] UserStoreError),
}

impl ReconciliationError {
    pub fn is_transient(&self) -> bool {
        match self {
            ReconciliationError::Store(e) => e.is_transient(),
            ReconciliationError::User(e) => matches!(e, UserStoreError::DatabaseError(_)),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SavingsApiError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    User(#[from] UserStoreError),
    #[error("{0}")]
    Phone(#[from] PhoneError),
    #[error("{0}")]
    Signature(#[from] WalletSignatureError),
    #[error("The wallet ownership proof does not verify")]
    InvalidOwnershipProof,
    #[error("Insufficient funds: balance is {available}, requested {requested}")]
    InsufficientFunds { available: Cents, requested: Cents },
    #[error("Requested amount must be positive")]
    NonPositiveAmount,
    #[error("The external call failed: {0}")]
    ExternalCallFailure(String),
    #[error("User #{0} has no wallet address bound")]
    NoWalletBound(i64),
    #[error("Goal is not accepting contributions: {0}")]
    GoalNotContributable(String),
}

impl From<GatewayError> for SavingsApiError {
    fn from(e: GatewayError) -> Self {
        SavingsApiError::ExternalCallFailure(e.to_string())
    }
}

impl From<LedgerError> for SavingsApiError {
    fn from(e: LedgerError) -> Self {
        SavingsApiError::ExternalCallFailure(e.to_string())
    }
}
