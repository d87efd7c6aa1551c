use std::{fmt::Debug, sync::Arc};

use akiba_common::Cents;
use chrono::Duration;
use log::*;

use crate::{
    cache::{CacheKey, ReadCache},
    db_types::{
        BalanceProjection,
        Goal,
        GoalStatus,
        NewGoal,
        NewPendingOperation,
        OperationKind,
        PendingOperation,
        User,
    },
    gateway::PaymentGateway,
    helpers::{normalize_msisdn, WalletSignature},
    ledger::{LedgerClient, SignedSubmission},
    retry::RetryPolicy,
    traits::{Pagination, ReconciliationDatabase},
};

use super::{
    errors::SavingsApiError,
    objects::{GoalView, TransactionList},
};

/// How long a dispatched operation may wait for its confirmation before the expiry sweep resolves it.
const DEFAULT_PENDING_TTL_HOURS: i64 = 2;

/// Which rail a deposit or withdrawal moves on.
#[derive(Debug, Clone)]
pub enum PaymentMethod {
    /// Push a mobile-money payment request to the phone.
    Mpesa { phone: String },
    /// Submit a pre-signed token transfer into the savings contract.
    Crypto { signed: SignedSubmission },
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub user_id: i64,
    pub amount: Cents,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: i64,
    pub amount: Cents,
    pub method: PaymentMethod,
    pub remark: Option<String>,
}

/// `SavingsApi` is the read/write surface consumed by the HTTP layer.
///
/// Reads go through the short-TTL cache and degrade to direct reads on miss. Each `request_*` call is the entry
/// point that durably records a pending operation and then dispatches the corresponding ledger or payment-gateway
/// call: the request succeeds as soon as the entry is persisted and the call is dispatched, and the eventual
/// settlement is delivered asynchronously through the reconciliation engine.
pub struct SavingsApi<B, L, G> {
    db: B,
    ledger: L,
    gateway: G,
    cache: Arc<ReadCache>,
    retry: RetryPolicy,
    pending_ttl: Duration,
}

impl<B, L, G> Debug for SavingsApi<B, L, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SavingsApi")
    }
}

impl<B, L, G> SavingsApi<B, L, G> {
    pub fn new(db: B, ledger: L, gateway: G, cache: Arc<ReadCache>) -> Self {
        Self {
            db,
            ledger,
            gateway,
            cache,
            retry: RetryPolicy::default(),
            pending_ttl: Duration::hours(DEFAULT_PENDING_TTL_HOURS),
        }
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<B, L, G> SavingsApi<B, L, G>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    //----------------------------------------- Read surface -----------------------------------------------------

    pub async fn get_balance(&self, user_id: i64) -> Result<BalanceProjection, SavingsApiError> {
        let key = CacheKey::Balance(user_id);
        if let Some(cached) = self.cache.get::<BalanceProjection>(&key).await {
            trace!("💰️ Balance for user #{user_id} served from cache");
            return Ok(cached);
        }
        let projection = self.db.fetch_balance(user_id).await?;
        self.cache.set(key, &projection).await;
        Ok(projection)
    }

    pub async fn list_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<TransactionList, SavingsApiError> {
        let key = CacheKey::TransactionList(user_id, pagination.page, pagination.limit);
        if let Some(cached) = self.cache.get::<TransactionList>(&key).await {
            return Ok(cached);
        }
        let records = self.db.fetch_transactions(user_id, pagination).await?;
        let list = TransactionList::new(records, pagination);
        self.cache.set(key, &list).await;
        Ok(list)
    }

    pub async fn get_goal(&self, user_id: i64, goal_id: i64) -> Result<GoalView, SavingsApiError> {
        let key = CacheKey::Goal(user_id, goal_id);
        if let Some(cached) = self.cache.get::<GoalView>(&key).await {
            return Ok(cached);
        }
        let view = GoalView::from(self.db.fetch_goal(user_id, goal_id).await?);
        self.cache.set(key, &view).await;
        Ok(view)
    }

    pub async fn list_goals(&self, user_id: i64) -> Result<Vec<GoalView>, SavingsApiError> {
        let key = CacheKey::GoalList(user_id);
        if let Some(cached) = self.cache.get::<Vec<GoalView>>(&key).await {
            return Ok(cached);
        }
        let views: Vec<GoalView> =
            self.db.fetch_goals_for_user(user_id).await?.into_iter().map(GoalView::from).collect();
        self.cache.set(key, &views).await;
        Ok(views)
    }

    pub async fn pending_operations(&self, user_id: i64) -> Result<Vec<PendingOperation>, SavingsApiError> {
        let ops = self.db.fetch_pending_for_user(user_id).await?;
        Ok(ops)
    }

    /// The contract-side balance for the user's bound wallet. Read-only; serves operator reconciliation views.
    pub async fn ledger_balance(&self, user_id: i64) -> Result<Cents, SavingsApiError> {
        let user = self.db.fetch_user(user_id).await?;
        let address = user.wallet_address.ok_or(SavingsApiError::NoWalletBound(user_id))?;
        let balance = self.ledger.get_balance(&address).await?;
        Ok(balance)
    }

    //----------------------------------------- Users -------------------------------------------------------------

    pub async fn register_user(&self, phone: &str) -> Result<User, SavingsApiError> {
        let msisdn = normalize_msisdn(phone)?;
        let user = self.db.create_user(&msisdn).await?;
        Ok(user)
    }

    /// Binds a wallet address to the user. The caller presents a [`WalletSignature`] ownership proof signed
    /// client-side; this backend only verifies it.
    pub async fn bind_wallet(&self, user_id: i64, proof: &WalletSignature) -> Result<User, SavingsApiError> {
        if proof.user_id != user_id || !proof.is_valid() {
            return Err(SavingsApiError::InvalidOwnershipProof);
        }
        let user = self.db.bind_wallet(user_id, &proof.address).await?;
        info!("🧑️ User #{user_id} bound wallet {}", proof.address);
        Ok(user)
    }

    //----------------------------------------- Write surface -----------------------------------------------------

    /// Records a pending deposit and dispatches the external call. Returns the pending operation; the settlement
    /// outcome arrives asynchronously via the reconciliation engine and the notification channel.
    pub async fn request_deposit(&self, request: DepositRequest) -> Result<PendingOperation, SavingsApiError> {
        if request.amount.value() <= 0 {
            return Err(SavingsApiError::NonPositiveAmount);
        }
        let user = self.db.fetch_user(request.user_id).await?;
        match request.method {
            PaymentMethod::Mpesa { phone } => {
                let msisdn = normalize_msisdn(&phone)?;
                let op = NewPendingOperation::new(
                    OperationKind::MpesaDeposit,
                    user.id,
                    request.amount,
                    msisdn.clone(),
                    self.pending_ttl,
                );
                let pending = self.db.create_pending(op).await?;
                self.dispatch_mpesa_deposit(pending, &msisdn).await
            },
            PaymentMethod::Crypto { signed } => {
                let address = user.wallet_address.clone().ok_or(SavingsApiError::NoWalletBound(user.id))?;
                let op = NewPendingOperation::new(
                    OperationKind::CryptoDeposit,
                    user.id,
                    request.amount,
                    address.as_str(),
                    self.pending_ttl,
                );
                let pending = self.db.create_pending(op).await?;
                self.dispatch_ledger_call(pending, |ledger, amount| {
                    let signed = signed.clone();
                    async move { ledger.deposit(amount, &signed).await }
                })
                .await
            },
        }
    }

    /// Records a pending withdrawal and dispatches the external call. The balance is pre-checked here and
    /// re-checked under the settlement's atomic unit, so a confirmation racing another debit can still be rejected.
    pub async fn request_withdrawal(&self, request: WithdrawalRequest) -> Result<PendingOperation, SavingsApiError> {
        if request.amount.value() <= 0 {
            return Err(SavingsApiError::NonPositiveAmount);
        }
        let user = self.db.fetch_user(request.user_id).await?;
        let projection = self.db.fetch_balance(user.id).await?;
        if projection.balance < request.amount {
            return Err(SavingsApiError::InsufficientFunds {
                available: projection.balance,
                requested: request.amount,
            });
        }
        match request.method {
            PaymentMethod::Mpesa { phone } => {
                let msisdn = normalize_msisdn(&phone)?;
                let op = NewPendingOperation::new(
                    OperationKind::MpesaWithdrawal,
                    user.id,
                    request.amount,
                    msisdn.clone(),
                    self.pending_ttl,
                );
                let pending = self.db.create_pending(op).await?;
                let remark = request.remark.unwrap_or_else(|| "Akiba savings withdrawal".to_string());
                self.dispatch_mpesa_withdrawal(pending, &msisdn, &remark).await
            },
            PaymentMethod::Crypto { signed } => {
                let address = user.wallet_address.clone().ok_or(SavingsApiError::NoWalletBound(user.id))?;
                let op = NewPendingOperation::new(
                    OperationKind::CryptoWithdrawal,
                    user.id,
                    request.amount,
                    address.as_str(),
                    self.pending_ttl,
                );
                let pending = self.db.create_pending(op).await?;
                self.dispatch_ledger_call(pending, |ledger, amount| {
                    let signed = signed.clone();
                    async move { ledger.withdraw(amount, &signed).await }
                })
                .await
            },
        }
    }

    /// Creates a savings goal, locally and (when the user has a wallet bound) on the savings contract.
    pub async fn create_goal(
        &self,
        user_id: i64,
        name: &str,
        target_amount: Cents,
        duration_days: u32,
    ) -> Result<Goal, SavingsApiError> {
        if target_amount.value() <= 0 {
            return Err(SavingsApiError::NonPositiveAmount);
        }
        let user = self.db.fetch_user(user_id).await?;
        let mut goal = NewGoal::new(user.id, name, target_amount)
            .with_deadline(chrono::Utc::now() + Duration::days(i64::from(duration_days)));
        if user.wallet_address.is_some() {
            match self.ledger.create_goal(name, target_amount, duration_days).await {
                Ok(chain_goal_id) => goal = goal.on_chain(chain_goal_id),
                Err(e) => {
                    // the custodial goal still works without its on-chain mirror
                    warn!("🎯️ Could not create on-chain goal for user #{user_id}: {e}. Creating local goal only.");
                },
            }
        }
        let goal = self.db.create_goal(goal).await?;
        self.cache.invalidate(&CacheKey::GoalList(user_id)).await;
        Ok(goal)
    }

    /// Records a pending goal contribution and dispatches the pre-signed transfer to the savings contract.
    pub async fn contribute_to_goal(
        &self,
        user_id: i64,
        goal_id: i64,
        amount: Cents,
        signed: SignedSubmission,
    ) -> Result<PendingOperation, SavingsApiError> {
        if amount.value() <= 0 {
            return Err(SavingsApiError::NonPositiveAmount);
        }
        let user = self.db.fetch_user(user_id).await?;
        let address = user.wallet_address.clone().ok_or(SavingsApiError::NoWalletBound(user_id))?;
        let goal = self.db.fetch_goal(user_id, goal_id).await?;
        if goal.status != GoalStatus::Active {
            return Err(SavingsApiError::GoalNotContributable(format!("goal #{goal_id} is {}", goal.status)));
        }
        let chain_goal_id = goal.chain_goal_id.ok_or_else(|| {
            SavingsApiError::GoalNotContributable(format!("goal #{goal_id} has no on-chain mirror"))
        })?;
        let op = NewPendingOperation::new(
            OperationKind::GoalContribution,
            user.id,
            amount,
            address.as_str(),
            self.pending_ttl,
        )
        .with_goal(goal.id);
        let pending = self.db.create_pending(op).await?;
        self.dispatch_ledger_call(pending, move |ledger, amount| {
            let signed = signed.clone();
            async move { ledger.contribute_to_goal(chain_goal_id, amount, &signed).await }
        })
        .await
    }

    pub async fn pause_goal(&self, user_id: i64, goal_id: i64) -> Result<Goal, SavingsApiError> {
        self.change_goal_status(user_id, goal_id, GoalStatus::Paused).await
    }

    pub async fn resume_goal(&self, user_id: i64, goal_id: i64) -> Result<Goal, SavingsApiError> {
        self.change_goal_status(user_id, goal_id, GoalStatus::Active).await
    }

    pub async fn cancel_goal(&self, user_id: i64, goal_id: i64) -> Result<Goal, SavingsApiError> {
        self.change_goal_status(user_id, goal_id, GoalStatus::Cancelled).await
    }

    async fn change_goal_status(
        &self,
        user_id: i64,
        goal_id: i64,
        status: GoalStatus,
    ) -> Result<Goal, SavingsApiError> {
        let goal = self.db.set_goal_status(user_id, goal_id, status).await?;
        self.cache.invalidate(&CacheKey::Goal(user_id, goal_id)).await;
        self.cache.invalidate(&CacheKey::GoalList(user_id)).await;
        Ok(goal)
    }

    //----------------------------------------- Dispatch helpers --------------------------------------------------

    async fn dispatch_mpesa_deposit(
        &self,
        pending: PendingOperation,
        msisdn: &str,
    ) -> Result<PendingOperation, SavingsApiError> {
        let result = self
            .retry
            .retry("initiate mpesa deposit", |e: &crate::gateway::GatewayError| e.is_transient(), || async {
                self.gateway.initiate_deposit(msisdn, pending.amount, &pending.correlation_id).await
            })
            .await;
        self.after_dispatch(pending, result.map_err(SavingsApiError::from)).await
    }

    async fn dispatch_mpesa_withdrawal(
        &self,
        pending: PendingOperation,
        msisdn: &str,
        remark: &str,
    ) -> Result<PendingOperation, SavingsApiError> {
        let result = self
            .retry
            .retry("initiate mpesa withdrawal", |e: &crate::gateway::GatewayError| e.is_transient(), || async {
                self.gateway.initiate_withdrawal(msisdn, pending.amount, remark).await
            })
            .await;
        self.after_dispatch(pending, result.map_err(SavingsApiError::from)).await
    }

    async fn dispatch_ledger_call<F, Fut>(
        &self,
        pending: PendingOperation,
        call: F,
    ) -> Result<PendingOperation, SavingsApiError>
    where
        F: Fn(L, Cents) -> Fut,
        Fut: std::future::Future<Output = Result<String, crate::ledger::LedgerError>>,
    {
        let result = self
            .retry
            .retry("submit ledger transaction", |e: &crate::ledger::LedgerError| e.is_transient(), || {
                call(self.ledger.clone(), pending.amount)
            })
            .await;
        let result = result
            .map(|tx_hash| crate::db_types::CorrelationId::from(tx_hash))
            .map_err(SavingsApiError::from);
        self.after_dispatch(pending, result).await
    }

    /// Re-keys the pending entry to the reference the external system assigned. When the dispatch itself failed,
    /// resolves the entry as failed instead, so it never dangles.
    async fn after_dispatch(
        &self,
        pending: PendingOperation,
        result: Result<crate::db_types::CorrelationId, SavingsApiError>,
    ) -> Result<PendingOperation, SavingsApiError> {
        match result {
            Ok(assigned) if assigned != pending.correlation_id => {
                let op = self.db.reassign_correlation(&pending.correlation_id, &assigned).await?;
                debug!("📨️ {} [{}] dispatched, provider reference [{assigned}]", op.kind, op.correlation_id);
                Ok(op)
            },
            Ok(_) => Ok(pending),
            Err(e) => {
                error!(
                    "📨️ Dispatch of {} [{}] failed: {e}. Recording the failure.",
                    pending.kind, pending.correlation_id
                );
                self.db.fail_pending(&pending.correlation_id, &e.to_string(), None).await?;
                self.cache.invalidate_user(pending.user_id).await;
                Err(e)
            },
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
