use std::{fmt::Debug, sync::Arc};

use akiba_common::Cents;
use log::*;

use crate::{
    cache::ReadCache,
    db_types::{Goal, GoalStatus, NewGoal, NewTransaction, OperationKind, TransactionRecord, TransactionStatus},
    events::{EventProducers, GoalReachedEvent, SettlementEvent},
    gateway::PaymentCallback,
    ledger::{ChainEvent, LedgerEventKind},
    retry::RetryPolicy,
    traits::{GoalRef, ReconciliationDatabase, Settlement, SettleOutcome, StoreError, SweepResult},
};

use super::errors::ReconciliationError;

/// How far a confirmed amount may drift from the requested amount and still settle the same pending operation:
/// 1% of the amount, at least one cent, capped at 100 cents. Providers round to whole currency units; anything
/// further apart is a different movement.
fn match_tolerance(amount: Cents) -> Cents {
    Cents::from((amount.value() / 100).clamp(1, 100))
}

/// The durable result of one processed confirmation, as reported to callers and workers.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub user_id: i64,
    pub transaction: TransactionRecord,
    pub new_balance: Cents,
    pub goal: Option<Goal>,
}

impl From<Settlement> for SettlementOutcome {
    fn from(s: Settlement) -> Self {
        Self { user_id: s.transaction.user_id, transaction: s.transaction, new_balance: s.new_balance, goal: s.goal }
    }
}

/// `ReconciliationApi` is the single authority that transitions money state. It consumes confirmations from the two
/// asynchronous delivery mechanisms (the ledger event stream and the payment provider's webhook), matches them to
/// pending operations, applies the durable mutation (with bounded retries on transient storage failure), invalidates
/// the affected cached read views strictly after commit, and publishes settlement events for the notification hooks.
///
/// Both entry points are safe under at-least-once delivery: redelivered chain events are absorbed by the
/// external-reference uniqueness guard, and duplicate webhooks by the pending operation's terminal-state check.
pub struct ReconciliationApi<B> {
    db: B,
    cache: Arc<ReadCache>,
    producers: EventProducers,
    retry: RetryPolicy,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, cache: Arc<ReadCache>, producers: EventProducers) -> Self {
        Self { db, cache, producers, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationDatabase
{
    /// Processes one on-chain event, delivered at-least-once by the ledger event stream.
    ///
    /// Returns `Ok(None)` when the event required no mutation (redelivery, unknown wallet, or an informational
    /// event), and the applied outcome otherwise.
    pub async fn process_ledger_event(&self, event: ChainEvent) -> Result<Option<SettlementOutcome>, ReconciliationError> {
        let external_ref = event.external_ref();
        // Idempotence guard: a redelivered event must be a no-op.
        if let Some(existing) = self.db.fetch_transaction_by_external_ref(&external_ref).await? {
            debug!("🔗️ Event [{external_ref}] was already recorded as transaction #{}. Ignoring redelivery.", existing.id);
            return Ok(None);
        }
        let Some(user) = self.db.fetch_user_by_wallet(&event.user).await? else {
            warn!("🔗️ Event [{external_ref}] references wallet {} which is not bound to any user. Ignoring.", event.user);
            return Ok(None);
        };
        match event.kind {
            LedgerEventKind::GoalCreated => {
                self.sync_external_goal(user.id, &event).await?;
                return Ok(None);
            },
            LedgerEventKind::GoalCompleted => {
                // completion is applied by the contribution that reaches the target; the chain's own completion
                // event is informational
                debug!("🎯️ Ledger reports goal {:?} completed for user #{}", event.goal_id, user.id);
                return Ok(None);
            },
            _ => {},
        }
        let kind = match event.kind {
            LedgerEventKind::Deposit => OperationKind::CryptoDeposit,
            LedgerEventKind::Withdrawal => OperationKind::CryptoWithdrawal,
            LedgerEventKind::GoalContributed => OperationKind::GoalContribution,
            _ => unreachable!("goal lifecycle events are handled above"),
        };
        let matched = self
            .db
            .find_matching_pending(event.user.as_str(), kind, event.amount, match_tolerance(event.amount))
            .await?;
        let outcome = match matched {
            Some(op) => {
                trace!("🔗️ Event [{external_ref}] matches pending operation [{}]", op.correlation_id);
                let cid = op.correlation_id.clone();
                let settle = self
                    .retry
                    .retry("settle ledger event", ReconciliationError::is_transient, || async {
                        self.db
                            .settle_pending(&cid, event.amount, Some(external_ref.as_str()), None)
                            .await
                            .map_err(ReconciliationError::from)
                    })
                    .await;
                match settle {
                    Ok(outcome) => outcome,
                    Err(ReconciliationError::Store(StoreError::NegativeBalance { balance, delta, .. })) => {
                        // a debit confirmation the projection cannot absorb is recorded as a failed movement, never
                        // silently clamped
                        let reason = format!("Settlement rejected: balance {balance} cannot absorb {delta}");
                        error!("🔗️ [{external_ref}] {reason}");
                        self.db.fail_pending(&cid, &reason, Some(external_ref.as_str())).await?
                    },
                    Err(e) => return Err(e),
                }
            },
            None => {
                // externally-initiated movement, e.g. a deposit made directly against the contract
                debug!("🔗️ Event [{external_ref}] has no pending operation; synthesizing an external movement");
                let record = NewTransaction::new(user.id, kind, TransactionStatus::Completed, event.amount)
                    .with_external_ref(&external_ref)
                    .with_description("Externally initiated on-chain movement");
                let goal = event.goal_id.map(|gid| (GoalRef::Chain(gid), event.amount));
                let result = self
                    .retry
                    .retry("record external movement", ReconciliationError::is_transient, || async {
                        self.db
                            .record_external_movement(record.clone(), goal)
                            .await
                            .map_err(ReconciliationError::from)
                    })
                    .await;
                match result {
                    Ok(outcome) => outcome,
                    Err(ReconciliationError::Store(StoreError::DuplicateExternalRef(r))) => {
                        // lost the race against a concurrent delivery of the same event
                        debug!("🔗️ Event [{r}] was recorded concurrently. Ignoring redelivery.");
                        return Ok(None);
                    },
                    Err(ReconciliationError::Store(StoreError::NegativeBalance { balance, delta, .. })) => {
                        let reason = format!("External debit rejected: balance {balance} cannot absorb {delta}");
                        error!("🔗️ [{external_ref}] {reason}");
                        let failed = NewTransaction::new(user.id, kind, TransactionStatus::Failed, event.amount)
                            .with_external_ref(&external_ref)
                            .with_description(&reason);
                        self.db.record_external_movement(failed, None).await?
                    },
                    Err(e) => return Err(e),
                }
            },
        };
        Ok(self.finish(outcome).await)
    }

    /// Processes one payment-provider webhook delivery.
    ///
    /// The payload is untrusted input validated only by matching it to a known pending operation. A missing pending
    /// entry (e.g. the expiry sweep won the race) is an expected condition: it is logged and `Ok(None)` is returned
    /// so the transport layer still acknowledges the delivery.
    pub async fn process_payment_callback(
        &self,
        callback: PaymentCallback,
    ) -> Result<Option<SettlementOutcome>, ReconciliationError> {
        let cid = callback.correlation_id.clone();
        let op = match self.db.fetch_pending(&cid).await {
            Ok(op) => op,
            Err(StoreError::OperationNotFound(_)) => {
                warn!("📨️ Callback [{cid}] does not match any pending operation. Acknowledging anyway.");
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        };
        let outcome = if callback.is_success() {
            let settled = callback.settled_amount_or(op.amount);
            let external_ref = format!("mpesa:{cid}");
            let settle = self
                .retry
                .retry("settle payment callback", ReconciliationError::is_transient, || async {
                    self.db
                        .settle_pending(&cid, settled, Some(external_ref.as_str()), Some(callback.result_description.as_str()))
                        .await
                        .map_err(ReconciliationError::from)
                })
                .await;
            match settle {
                Ok(outcome) => outcome,
                Err(ReconciliationError::Store(StoreError::NegativeBalance { balance, delta, .. })) => {
                    let reason = format!("Settlement rejected: balance {balance} cannot absorb {delta}");
                    error!("📨️ [{cid}] {reason}");
                    self.db.fail_pending(&cid, &reason, Some(external_ref.as_str())).await?
                },
                Err(e) => return Err(e),
            }
        } else {
            self.retry
                .retry("fail payment callback", ReconciliationError::is_transient, || async {
                    self.db.fail_pending(&cid, &callback.result_description, None).await.map_err(ReconciliationError::from)
                })
                .await?
        };
        Ok(self.finish(outcome).await)
    }

    /// Expires every pending operation past its deadline. Runs on a recurring timer; the backing transition is
    /// atomic, so concurrent sweeps never double-expire or double-notify an entry.
    pub async fn sweep_expired(&self) -> Result<SweepResult, ReconciliationError> {
        let result = self
            .retry
            .retry("sweep expired operations", ReconciliationError::is_transient, || async {
                self.db.sweep_expired().await.map_err(ReconciliationError::from)
            })
            .await?;
        for op in &result.expired {
            info!("🕰️ Pending {} [{}] for user #{} expired without confirmation", op.kind, op.correlation_id, op.user_id);
            self.cache.invalidate_user(op.user_id).await;
            let event = SettlementEvent::expired(op.clone());
            self.call_settlement_hooks(event).await;
        }
        Ok(result)
    }

    /// Creates a local goal record for a goal that was created directly against the contract.
    async fn sync_external_goal(&self, user_id: i64, event: &ChainEvent) -> Result<(), ReconciliationError> {
        let Some(chain_goal_id) = event.goal_id else {
            return Ok(());
        };
        if self.db.fetch_goal_by_chain_id(chain_goal_id).await?.is_some() {
            return Ok(());
        }
        let goal = NewGoal::new(user_id, format!("On-chain goal #{chain_goal_id}"), event.amount).on_chain(chain_goal_id);
        let goal = self.db.create_goal(goal).await?;
        info!("🎯️ Synthesized local record for externally created goal #{} (chain id {chain_goal_id})", goal.id);
        Ok(())
    }

    /// Cache invalidation and hook publication for an applied settlement. Both are best-effort and never roll back
    /// the durable mutation that precedes them.
    async fn finish(&self, outcome: SettleOutcome) -> Option<SettlementOutcome> {
        let settlement = match outcome {
            SettleOutcome::Applied(settlement) => settlement,
            SettleOutcome::AlreadyTerminal(_) => return None,
        };
        let outcome = SettlementOutcome::from(settlement);
        self.cache.invalidate_user(outcome.user_id).await;
        let event = match outcome.transaction.status {
            TransactionStatus::Completed => SettlementEvent::completed(outcome.user_id, outcome.transaction.clone()),
            TransactionStatus::Failed => SettlementEvent::failed(outcome.user_id, outcome.transaction.clone()),
        };
        self.call_settlement_hooks(event).await;
        if let Some(goal) = &outcome.goal {
            if goal.status == GoalStatus::Completed && goal.completed_at.is_some() {
                self.call_goal_hooks(GoalReachedEvent::new(goal.clone())).await;
            }
        }
        Some(outcome)
    }

    async fn call_settlement_hooks(&self, event: SettlementEvent) {
        for emitter in &self.producers.settlement_producer {
            trace!("📬️ Notifying settlement hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    async fn call_goal_hooks(&self, event: GoalReachedEvent) {
        for emitter in &self.producers.goal_reached_producer {
            trace!("📬️ Notifying goal-reached hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
