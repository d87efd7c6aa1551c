//! `SqliteDatabase` is a concrete implementation of an Akiba reconciliation backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Flow methods open one transaction per call, so a settlement either applies in full (pending transition,
//! transaction record, balance delta, goal delta) or not at all.
use std::fmt::Debug;

use akiba_common::Cents;
use log::*;
use sqlx::SqlitePool;

use super::db::{balances, db_url, goals, new_pool, pending_ops, transactions, users};
use crate::{
    db_types::{
        BalanceProjection,
        CorrelationId,
        Goal,
        GoalStatus,
        NewGoal,
        NewPendingOperation,
        NewTransaction,
        OperationKind,
        OperationStatus,
        PendingOperation,
        TransactionRecord,
        TransactionStatus,
        User,
        WalletAddress,
    },
    traits::{
        GoalRef,
        Pagination,
        ProjectionReads,
        ReconciliationDatabase,
        Settlement,
        SettleOutcome,
        StoreError,
        SweepResult,
        UserManagement,
        UserStoreError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using `AKIBA_DATABASE_URL` (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_pending(&self, op: NewPendingOperation) -> Result<PendingOperation, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let pending = pending_ops::insert(op, &mut conn).await?;
        debug!(
            "⏳️ Pending {} [{}] recorded for user #{}: {} -> {}",
            pending.kind, pending.correlation_id, pending.user_id, pending.amount, pending.target
        );
        Ok(pending)
    }

    async fn fetch_pending(&self, cid: &CorrelationId) -> Result<PendingOperation, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending_ops::fetch_by_correlation(cid, &mut conn)
            .await?
            .ok_or_else(|| StoreError::OperationNotFound(cid.clone()))
    }

    async fn reassign_correlation(
        &self,
        current: &CorrelationId,
        assigned: &CorrelationId,
    ) -> Result<PendingOperation, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let op = pending_ops::reassign_correlation(current, assigned, &mut conn).await?;
        debug!("⏳️ Pending operation re-keyed from [{current}] to provider reference [{assigned}]");
        Ok(op)
    }

    async fn settle_pending(
        &self,
        cid: &CorrelationId,
        settled: Cents,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> Result<SettleOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let op = pending_ops::fetch_by_correlation(cid, &mut tx)
            .await?
            .ok_or_else(|| StoreError::OperationNotFound(cid.clone()))?;
        if op.status.is_terminal() {
            debug!("⏳️ Pending operation [{cid}] is already {}. Duplicate delivery ignored.", op.status);
            return Ok(SettleOutcome::AlreadyTerminal(op));
        }
        let op = pending_ops::transition(cid, OperationStatus::Completed, &mut tx)
            .await?
            .ok_or_else(|| StoreError::AlreadyTerminal(cid.clone()))?;
        let mut record = NewTransaction::new(op.user_id, op.kind, TransactionStatus::Completed, settled)
            .for_pending_op(&op);
        if let Some(external_ref) = external_ref {
            record = record.with_external_ref(external_ref);
        }
        if let Some(description) = description {
            record = record.with_description(description);
        }
        let transaction = transactions::insert(record, &mut tx).await?;
        let delta = if op.kind.is_credit() { settled } else { -settled };
        let projection = balances::apply_delta(op.user_id, delta, &mut tx).await?;
        let goal = match (op.kind, op.goal_id) {
            (OperationKind::GoalContribution, Some(goal_id)) => {
                Some(goals::apply_contribution(goal_id, settled, &mut tx).await?)
            },
            _ => None,
        };
        tx.commit().await?;
        debug!("✅️ [{cid}] settled: {} {}. New balance for user #{} is {}", op.kind, settled, op.user_id, projection.balance);
        Ok(SettleOutcome::Applied(Settlement {
            operation: Some(op),
            transaction,
            new_balance: projection.balance,
            goal,
        }))
    }

    async fn fail_pending(
        &self,
        cid: &CorrelationId,
        reason: &str,
        external_ref: Option<&str>,
    ) -> Result<SettleOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let op = pending_ops::fetch_by_correlation(cid, &mut tx)
            .await?
            .ok_or_else(|| StoreError::OperationNotFound(cid.clone()))?;
        if op.status.is_terminal() {
            debug!("⏳️ Pending operation [{cid}] is already {}. Duplicate delivery ignored.", op.status);
            return Ok(SettleOutcome::AlreadyTerminal(op));
        }
        let op = pending_ops::transition(cid, OperationStatus::Failed, &mut tx)
            .await?
            .ok_or_else(|| StoreError::AlreadyTerminal(cid.clone()))?;
        let mut record = NewTransaction::new(op.user_id, op.kind, TransactionStatus::Failed, op.amount)
            .with_description(reason)
            .for_pending_op(&op);
        if let Some(external_ref) = external_ref {
            record = record.with_external_ref(external_ref);
        }
        let transaction = transactions::insert(record, &mut tx).await?;
        let projection = balances::fetch(op.user_id, &mut tx).await?;
        tx.commit().await?;
        warn!("❌️ [{cid}] failed: {reason}");
        Ok(SettleOutcome::Applied(Settlement {
            operation: Some(op),
            transaction,
            new_balance: projection.balance,
            goal: None,
        }))
    }

    async fn record_external_movement(
        &self,
        record: NewTransaction,
        goal: Option<(GoalRef, Cents)>,
    ) -> Result<SettleOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user_id = record.user_id;
        let kind = record.kind;
        let status = record.status;
        let amount = record.amount;
        let transaction = transactions::insert(record, &mut tx).await?;
        let projection = if status == TransactionStatus::Completed {
            let delta = if kind.is_credit() { amount } else { -amount };
            balances::apply_delta(user_id, delta, &mut tx).await?
        } else {
            balances::fetch(user_id, &mut tx).await?
        };
        let goal = match goal {
            Some((goal_ref, contribution)) if status == TransactionStatus::Completed => {
                let goal_id = match goal_ref {
                    GoalRef::Local(id) => Some(id),
                    GoalRef::Chain(chain_id) => goals::fetch_by_chain_id(chain_id, &mut tx).await?.map(|g| g.id),
                };
                match goal_id {
                    Some(goal_id) => Some(goals::apply_contribution(goal_id, contribution, &mut tx).await?),
                    None => {
                        warn!("🎯️ Ledger reported a contribution to an unknown goal ({goal_ref:?}). Balance was adjusted; no goal progress recorded.");
                        None
                    },
                }
            },
            _ => None,
        };
        tx.commit().await?;
        debug!("🔗️ External {kind} of {amount} recorded for user #{user_id}");
        Ok(SettleOutcome::Applied(Settlement { operation: None, transaction, new_balance: projection.balance, goal }))
    }

    async fn find_matching_pending(
        &self,
        target: &str,
        kind: OperationKind,
        amount: Cents,
        tolerance: Cents,
    ) -> Result<Option<PendingOperation>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let op = pending_ops::find_match(target, kind, amount, tolerance, &mut conn).await?;
        Ok(op)
    }

    async fn sweep_expired(&self) -> Result<SweepResult, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let expired = pending_ops::expire_overdue(&mut conn).await?;
        if !expired.is_empty() {
            info!("🕰️ {} pending operations expired", expired.len());
        }
        Ok(SweepResult { expired })
    }

    async fn create_goal(&self, goal: NewGoal) -> Result<Goal, StoreError> {
        let mut conn = self.pool.acquire().await?;
        goals::insert(goal, &mut conn).await
    }

    async fn set_goal_status(&self, user_id: i64, goal_id: i64, new_status: GoalStatus) -> Result<Goal, StoreError> {
        let mut tx = self.pool.begin().await?;
        let goal = goals::set_status(user_id, goal_id, new_status, &mut tx).await?;
        tx.commit().await?;
        debug!("🎯️ Goal #{goal_id} is now {new_status}");
        Ok(goal)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ProjectionReads for SqliteDatabase {
    async fn fetch_balance(&self, user_id: i64) -> Result<BalanceProjection, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let projection = balances::fetch(user_id, &mut conn).await?;
        Ok(projection)
    }

    async fn fetch_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let records = transactions::fetch_for_user(user_id, pagination, &mut conn).await?;
        Ok(records)
    }

    async fn fetch_transaction_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let record = transactions::fetch_by_external_ref(external_ref, &mut conn).await?;
        Ok(record)
    }

    async fn fetch_goal(&self, user_id: i64, goal_id: i64) -> Result<Goal, StoreError> {
        let mut conn = self.pool.acquire().await?;
        goals::fetch(user_id, goal_id, &mut conn).await?.ok_or(StoreError::GoalNotFound(goal_id))
    }

    async fn fetch_goals_for_user(&self, user_id: i64) -> Result<Vec<Goal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let goals = goals::fetch_for_user(user_id, &mut conn).await?;
        Ok(goals)
    }

    async fn fetch_goal_by_chain_id(&self, chain_goal_id: i64) -> Result<Option<Goal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let goal = goals::fetch_by_chain_id(chain_goal_id, &mut conn).await?;
        Ok(goal)
    }

    async fn fetch_pending_for_user(&self, user_id: i64) -> Result<Vec<PendingOperation>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let ops = pending_ops::fetch_pending_for_user(user_id, &mut conn).await?;
        Ok(ops)
    }
}

impl UserManagement for SqliteDatabase {
    async fn fetch_user(&self, user_id: i64) -> Result<User, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| UserStoreError::DatabaseError(e.to_string()))?;
        users::fetch(user_id, &mut conn).await?.ok_or(UserStoreError::UserNotFound(user_id))
    }

    async fn fetch_user_by_wallet(&self, address: &WalletAddress) -> Result<Option<User>, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| UserStoreError::DatabaseError(e.to_string()))?;
        let user = users::fetch_by_wallet(address, &mut conn).await?;
        Ok(user)
    }

    async fn create_user(&self, phone: &str) -> Result<User, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| UserStoreError::DatabaseError(e.to_string()))?;
        users::insert(phone, &mut conn).await
    }

    async fn bind_wallet(&self, user_id: i64, address: &WalletAddress) -> Result<User, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| UserStoreError::DatabaseError(e.to_string()))?;
        users::bind_wallet(user_id, address, &mut conn).await
    }

    async fn deactivate_user(&self, user_id: i64) -> Result<User, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| UserStoreError::DatabaseError(e.to_string()))?;
        users::deactivate(user_id, &mut conn).await
    }
}
