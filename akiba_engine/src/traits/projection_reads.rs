use crate::{
    db_types::{BalanceProjection, Goal, PendingOperation, TransactionRecord},
    traits::{data_objects::Pagination, reconciliation_db::StoreError},
};

/// Read access to the projection store. Request handlers only ever read through this trait (optionally via the read
/// cache); all writes go through [`super::ReconciliationDatabase`].
#[allow(async_fn_in_trait)]
pub trait ProjectionReads: Clone {
    /// The balance projection for the user. Users without any settled movement yet get a zero projection rather
    /// than an error.
    async fn fetch_balance(&self, user_id: i64) -> Result<BalanceProjection, StoreError>;

    /// Settled and failed movements for the user, newest first.
    async fn fetch_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn fetch_transaction_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn fetch_goal(&self, user_id: i64, goal_id: i64) -> Result<Goal, StoreError>;

    async fn fetch_goals_for_user(&self, user_id: i64) -> Result<Vec<Goal>, StoreError>;

    async fn fetch_goal_by_chain_id(&self, chain_goal_id: i64) -> Result<Option<Goal>, StoreError>;

    /// All non-terminal operations for the user, oldest first.
    async fn fetch_pending_for_user(&self, user_id: i64) -> Result<Vec<PendingOperation>, StoreError>;
}
