//! End-to-end settlement flows: webhook deliveries, ledger events, and the idempotence guarantees around both.
mod helpers;

use std::sync::Arc;

use akiba_common::Cents;
use akiba_engine::{
    cache::ReadCache,
    db_types::{NewPendingOperation, OperationKind, OperationStatus, TransactionStatus, WalletAddress},
    events::EventProducers,
    gateway::PaymentCallback,
    ledger::{ChainEvent, LedgerEventKind},
    traits::{Pagination, ProjectionReads, ReconciliationDatabase, UserManagement},
    DepositRequest,
    PaymentMethod,
    ReconciliationApi,
    SavingsApi,
    SavingsApiError,
    SqliteDatabase,
    WithdrawalRequest,
};
use helpers::{prepare_test_env, random_db_path, DownGateway, StubGateway, StubLedger};

async fn setup() -> (SqliteDatabase, Arc<ReadCache>) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let cache = Arc::new(ReadCache::new(std::time::Duration::from_secs(60)));
    (db, cache)
}

fn deposit_event(wallet: &str, amount: i64, tx_hash: &str) -> ChainEvent {
    ChainEvent {
        kind: LedgerEventKind::Deposit,
        user: WalletAddress::from(wallet),
        amount: Cents::from(amount),
        goal_id: None,
        tx_hash: tx_hash.to_string(),
        log_index: 0,
        block_number: 100,
    }
}

#[tokio::test]
async fn mpesa_deposit_settles_once_and_absorbs_duplicate_webhooks() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000001").await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    let pending = api
        .request_deposit(DepositRequest {
            user_id: user.id,
            amount: Cents::from(10_000),
            method: PaymentMethod::Mpesa { phone: "0712345678".to_string() },
        })
        .await
        .expect("deposit request should be accepted");
    assert_eq!(pending.status, OperationStatus::Pending);
    assert_eq!(pending.target, "254712345678");

    let callback = PaymentCallback {
        correlation_id: pending.correlation_id.clone(),
        result_code: 0,
        result_description: "The service request is processed successfully.".to_string(),
        settled_amount: Some(10_000),
        phone: Some("254712345678".to_string()),
    };
    let outcome = rec
        .process_payment_callback(callback.clone())
        .await
        .expect("callback processing should not error")
        .expect("first delivery applies a settlement");
    assert_eq!(outcome.new_balance, Cents::from(10_000));
    assert_eq!(outcome.transaction.kind, OperationKind::MpesaDeposit);
    assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
    assert_eq!(outcome.transaction.amount, Cents::from(10_000));

    let settled = db.fetch_pending(&pending.correlation_id).await.unwrap();
    assert_eq!(settled.status, OperationStatus::Completed);

    // the same webhook again is a no-op: no new transaction, balance unchanged
    let duplicate = rec.process_payment_callback(callback).await.unwrap();
    assert!(duplicate.is_none());
    let balance = db.fetch_balance(user.id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(10_000));
    let history = db.fetch_transactions(user.id, Pagination::default()).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn provider_settled_amount_wins_over_requested_amount() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000002").await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    let pending = api
        .request_deposit(DepositRequest {
            user_id: user.id,
            amount: Cents::from(9_999),
            method: PaymentMethod::Mpesa { phone: "0712345678".to_string() },
        })
        .await
        .unwrap();
    // provider rounded up to a whole shilling
    let callback = PaymentCallback {
        correlation_id: pending.correlation_id.clone(),
        result_code: 0,
        result_description: "Success".to_string(),
        settled_amount: Some(10_000),
        phone: None,
    };
    let outcome = rec.process_payment_callback(callback).await.unwrap().unwrap();
    assert_eq!(outcome.transaction.amount, Cents::from(10_000));
    assert_eq!(outcome.new_balance, Cents::from(10_000));
}

#[tokio::test]
async fn failed_callback_records_failed_transaction_without_balance_change() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000003").await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    let pending = api
        .request_deposit(DepositRequest {
            user_id: user.id,
            amount: Cents::from(5_000),
            method: PaymentMethod::Mpesa { phone: "0712345678".to_string() },
        })
        .await
        .unwrap();
    let callback = PaymentCallback {
        correlation_id: pending.correlation_id.clone(),
        result_code: 1032,
        result_description: "Request cancelled by user".to_string(),
        settled_amount: None,
        phone: None,
    };
    let outcome = rec.process_payment_callback(callback).await.unwrap().unwrap();
    assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
    assert_eq!(outcome.transaction.description.as_deref(), Some("Request cancelled by user"));
    assert_eq!(outcome.new_balance, Cents::from(0));
    let settled = db.fetch_pending(&pending.correlation_id).await.unwrap();
    assert_eq!(settled.status, OperationStatus::Failed);
}

#[tokio::test]
async fn callback_for_unknown_correlation_id_is_acknowledged_quietly() {
    let (db, cache) = setup().await;
    let rec = ReconciliationApi::new(db.clone(), cache, EventProducers::default());
    let callback = PaymentCallback {
        correlation_id: "never-heard-of-it".to_string().into(),
        result_code: 0,
        result_description: "Success".to_string(),
        settled_amount: Some(1_000),
        phone: None,
    };
    // not an error to propagate to the provider, and no state change
    let outcome = rec.process_payment_callback(callback).await.unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn duplicate_ledger_events_apply_exactly_one_delta() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000004").await.unwrap();
    let wallet = WalletAddress::from("a1b2c3d4e5f60708090a0b0c0d0e0f1011121314");
    db.bind_wallet(user.id, &wallet).await.unwrap();
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    let event = deposit_event(wallet.as_str(), 7_500, "0xaaa");
    let first = rec.process_ledger_event(event.clone()).await.unwrap();
    assert!(first.is_some());
    let second = rec.process_ledger_event(event).await.unwrap();
    assert!(second.is_none());

    let balance = db.fetch_balance(user.id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(7_500));
    let history = db.fetch_transactions(user.id, Pagination::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].external_ref.as_deref(), Some("0xaaa:0"));
}

#[tokio::test]
async fn ledger_event_settles_matching_pending_operation() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000005").await.unwrap();
    let wallet = WalletAddress::from("b1b2c3d4e5f60708090a0b0c0d0e0f1011121314");
    db.bind_wallet(user.id, &wallet).await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    let pending = api
        .request_deposit(DepositRequest {
            user_id: user.id,
            amount: Cents::from(20_000),
            method: PaymentMethod::Crypto {
                signed: akiba_engine::ledger::SignedSubmission { raw_tx: "deadbeef".to_string() },
            },
        })
        .await
        .unwrap();
    assert_eq!(pending.status, OperationStatus::Pending);

    let event = deposit_event(wallet.as_str(), 20_000, "0xbbb");
    let outcome = rec.process_ledger_event(event).await.unwrap().expect("event settles the pending operation");
    assert_eq!(outcome.new_balance, Cents::from(20_000));

    let settled = db.fetch_pending(&pending.correlation_id).await.unwrap();
    assert_eq!(settled.status, OperationStatus::Completed);
    let history = db.fetch_transactions(user.id, Pagination::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].pending_op_id, Some(pending.id));
}

#[tokio::test]
async fn externally_initiated_withdrawal_is_synthesized_without_pending_operation() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000006").await.unwrap();
    let wallet = WalletAddress::from("c1b2c3d4e5f60708090a0b0c0d0e0f1011121314");
    db.bind_wallet(user.id, &wallet).await.unwrap();
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    rec.process_ledger_event(deposit_event(wallet.as_str(), 30_000, "0xccc")).await.unwrap();

    // a withdrawal the backend never initiated, made directly against the contract
    let event = ChainEvent {
        kind: LedgerEventKind::Withdrawal,
        user: wallet.clone(),
        amount: Cents::from(12_000),
        goal_id: None,
        tx_hash: "0xddd".to_string(),
        log_index: 1,
        block_number: 101,
    };
    let outcome = rec.process_ledger_event(event).await.unwrap().expect("external movement is recorded");
    assert!(outcome.transaction.pending_op_id.is_none());
    assert_eq!(outcome.new_balance, Cents::from(18_000));

    let balance = db.fetch_balance(user.id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(18_000));
    assert_eq!(balance.total_withdrawn, Cents::from(12_000));
}

#[tokio::test]
async fn settlement_that_would_overdraw_is_rejected_and_recorded_as_failed() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000007").await.unwrap();
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    // seed a small balance
    let seed = NewPendingOperation::new(
        OperationKind::MpesaDeposit,
        user.id,
        Cents::from(1_000),
        "254712345678",
        chrono::Duration::hours(1),
    );
    let seed = db.create_pending(seed).await.unwrap();
    rec.process_payment_callback(PaymentCallback {
        correlation_id: seed.correlation_id.clone(),
        result_code: 0,
        result_description: "Success".to_string(),
        settled_amount: Some(1_000),
        phone: None,
    })
    .await
    .unwrap();

    // a payout confirmation for more than the balance can absorb
    let payout = NewPendingOperation::new(
        OperationKind::MpesaWithdrawal,
        user.id,
        Cents::from(5_000),
        "254712345678",
        chrono::Duration::hours(1),
    );
    let payout = db.create_pending(payout).await.unwrap();
    let outcome = rec
        .process_payment_callback(PaymentCallback {
            correlation_id: payout.correlation_id.clone(),
            result_code: 0,
            result_description: "Success".to_string(),
            settled_amount: Some(5_000),
            phone: None,
        })
        .await
        .unwrap()
        .expect("rejection still resolves the operation");
    assert_eq!(outcome.transaction.status, TransactionStatus::Failed);

    // never silently clamped: balance is untouched and the operation is failed, not completed
    let balance = db.fetch_balance(user.id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(1_000));
    let resolved = db.fetch_pending(&payout.correlation_id).await.unwrap();
    assert_eq!(resolved.status, OperationStatus::Failed);
}

#[tokio::test]
async fn balance_reads_after_settlement_never_serve_stale_values() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000008").await.unwrap();
    let wallet = WalletAddress::from("d1b2c3d4e5f60708090a0b0c0d0e0f1011121314");
    db.bind_wallet(user.id, &wallet).await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());
    let rec = ReconciliationApi::new(db.clone(), cache.clone(), EventProducers::default());

    // populate the cache with the pre-mutation value
    let before = api.get_balance(user.id).await.unwrap();
    assert_eq!(before.balance, Cents::from(0));

    // commit the mutation, which invalidates after commit
    rec.process_ledger_event(deposit_event(wallet.as_str(), 4_200, "0xeee")).await.unwrap();

    // the next read must reflect the committed value, not the cached pre-mutation one
    let after = api.get_balance(user.id).await.unwrap();
    assert_eq!(after.balance, Cents::from(4_200));
}

#[tokio::test]
async fn withdrawal_request_is_rejected_when_balance_is_insufficient() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000009").await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), StubGateway::default(), cache.clone());

    let result = api
        .request_withdrawal(WithdrawalRequest {
            user_id: user.id,
            amount: Cents::from(1_000),
            method: PaymentMethod::Mpesa { phone: "0712345678".to_string() },
            remark: None,
        })
        .await;
    assert!(matches!(result, Err(SavingsApiError::InsufficientFunds { .. })));
}

#[tokio::test]
async fn failed_dispatch_resolves_the_pending_operation_as_failed() {
    let (db, cache) = setup().await;
    let user = db.create_user("254700000010").await.unwrap();
    let api = SavingsApi::new(db.clone(), StubLedger::default(), DownGateway, cache.clone());

    let result = api
        .request_deposit(DepositRequest {
            user_id: user.id,
            amount: Cents::from(2_000),
            method: PaymentMethod::Mpesa { phone: "0712345678".to_string() },
        })
        .await;
    assert!(matches!(result, Err(SavingsApiError::ExternalCallFailure(_))));

    // the pending entry resolved to a failed transaction, visible in history; it never silently disappears
    let history = db.fetch_transactions(user.id, Pagination::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Failed);
    let pending = db.fetch_pending_for_user(user.id).await.unwrap();
    assert!(pending.is_empty());
}
