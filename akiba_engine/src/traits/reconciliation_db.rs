use akiba_common::Cents;
use thiserror::Error;

use crate::{
    db_types::{
        CorrelationId,
        Goal,
        GoalStatus,
        NewGoal,
        NewPendingOperation,
        NewTransaction,
        OperationKind,
        PendingOperation,
    },
    traits::{data_objects::{GoalRef, SettleOutcome, SweepResult}, ProjectionReads, UserManagement},
};

/// The write-side contract for backends supporting the Akiba reconciliation engine.
///
/// This behaviour includes:
/// * Recording pending operations before an external system is invoked
/// * Settling pending operations when the matching confirmation arrives
/// * Recording externally-initiated movements discovered via event sync
/// * The expiry sweep
///
/// Every settle/fail/record method performs its pending-operation transition, transaction insert, balance delta and
/// goal delta inside one atomic database transaction: either all of them apply, or none do.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: Clone + ProjectionReads + UserManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Durably records a new in-flight operation.
    ///
    /// Fails with [`StoreError::DuplicateCorrelation`] if a *pending* entry with the same correlation id already
    /// exists. Terminal entries do not block re-use, but correlation ids are expected to be globally unique anyway.
    async fn create_pending(&self, op: NewPendingOperation) -> Result<PendingOperation, StoreError>;

    /// Fetches a pending operation by correlation id, terminal or not.
    async fn fetch_pending(&self, cid: &CorrelationId) -> Result<PendingOperation, StoreError>;

    /// Re-keys a pending entry from the self-generated correlation id to the id the provider assigned when the
    /// external call returned. The entry must still be pending.
    async fn reassign_correlation(
        &self,
        current: &CorrelationId,
        assigned: &CorrelationId,
    ) -> Result<PendingOperation, StoreError>;

    /// Settles a pending operation as successful: marks it `Completed`, inserts the transaction record, applies the
    /// balance delta, and (for goal contributions) increments the goal and evaluates its completion transition, all
    /// in one transaction.
    ///
    /// `settled` is the amount the external system actually confirmed, which wins over the requested amount.
    /// A delivery for an operation that is already terminal returns [`SettleOutcome::AlreadyTerminal`] without
    /// touching any state. A debit that would drive the balance negative fails with
    /// [`StoreError::NegativeBalance`] and rolls back; the caller decides how to record the failure.
    async fn settle_pending(
        &self,
        cid: &CorrelationId,
        settled: Cents,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> Result<SettleOutcome, StoreError>;

    /// Settles a pending operation as failed: marks it `Failed` and inserts a failed transaction carrying the
    /// provider's error description. No balance delta is applied. When the failure was triggered by a confirmation
    /// that carries an immutable identity (a chain event), pass it as `external_ref` so a redelivery of the same
    /// confirmation hits the idempotence guard.
    async fn fail_pending(
        &self,
        cid: &CorrelationId,
        reason: &str,
        external_ref: Option<&str>,
    ) -> Result<SettleOutcome, StoreError>;

    /// Records a movement that has no corresponding pending operation (e.g. a deposit made directly against the
    /// contract, bypassing this backend): inserts the transaction and applies the balance/goal deltas atomically.
    ///
    /// Fails with [`StoreError::DuplicateExternalRef`] if a transaction with the same external reference already
    /// exists; this is the idempotence guard against redelivered chain events.
    async fn record_external_movement(
        &self,
        tx: NewTransaction,
        goal: Option<(GoalRef, Cents)>,
    ) -> Result<SettleOutcome, StoreError>;

    /// Looks for a pending operation that a ledger event can settle: same target wallet, same kind, amount within
    /// `tolerance` of the event amount. The oldest match wins.
    async fn find_matching_pending(
        &self,
        target: &str,
        kind: OperationKind,
        amount: Cents,
        tolerance: Cents,
    ) -> Result<Option<PendingOperation>, StoreError>;

    /// Transitions every pending operation whose deadline has passed to `Expired` and returns them. The transition
    /// is a single atomic update, so concurrent sweepers never yield the same entry twice.
    async fn sweep_expired(&self) -> Result<SweepResult, StoreError>;

    /// Creates a new goal record.
    async fn create_goal(&self, goal: NewGoal) -> Result<Goal, StoreError>;

    /// Changes a goal's lifecycle status (pause/resume/cancel). `Completed` is never a valid argument here, since
    /// that transition is taken exclusively by the settlement path. Terminal states cannot be left.
    async fn set_goal_status(&self, user_id: i64, goal_id: i64, new_status: GoalStatus) -> Result<Goal, StoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("A pending operation already exists for correlation id {0}")]
    DuplicateCorrelation(CorrelationId),
    #[error("No pending operation exists for correlation id {0}")]
    OperationNotFound(CorrelationId),
    #[error("Pending operation {0} is already in a terminal state")]
    AlreadyTerminal(CorrelationId),
    #[error("A transaction already exists with external reference {0}")]
    DuplicateExternalRef(String),
    #[error("The delta would drive the balance for user {user_id} below zero (balance {balance}, delta {delta})")]
    NegativeBalance { user_id: i64, balance: Cents, delta: Cents },
    #[error("The requested goal {0} does not exist")]
    GoalNotFound(i64),
    #[error("The requested goal status change is forbidden: {0}")]
    GoalTransitionForbidden(String),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
    #[error("{0}")]
    UserError(#[from] super::UserStoreError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl StoreError {
    /// Whether a retry with backoff has any chance of succeeding. Pool exhaustion and I/O hiccups are transient;
    /// constraint violations and not-found conditions are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::DatabaseError(_))
    }
}
