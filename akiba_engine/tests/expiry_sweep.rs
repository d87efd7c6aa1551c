//! Expiry sweep semantics: at-most-once expiry per entry, also under concurrent sweepers.
mod helpers;

use std::sync::Arc;

use akiba_common::Cents;
use akiba_engine::{
    cache::ReadCache,
    db_types::{NewPendingOperation, OperationKind, OperationStatus},
    events::EventProducers,
    gateway::PaymentCallback,
    traits::{Pagination, ProjectionReads, ReconciliationDatabase, UserManagement},
    ReconciliationApi,
    SqliteDatabase,
};
use helpers::{prepare_test_env, random_db_path};

async fn setup() -> (SqliteDatabase, ReconciliationApi<SqliteDatabase>, i64) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let cache = Arc::new(ReadCache::new(std::time::Duration::from_secs(60)));
    let rec = ReconciliationApi::new(db.clone(), cache, EventProducers::default());
    let user = db.create_user("254722000001").await.unwrap();
    (db, rec, user.id)
}

fn overdue_op(user_id: i64, amount: i64) -> NewPendingOperation {
    NewPendingOperation::new(
        OperationKind::MpesaDeposit,
        user_id,
        Cents::from(amount),
        "254722000001",
        chrono::Duration::hours(-1),
    )
}

#[tokio::test]
async fn sweep_expires_overdue_entries_exactly_once() {
    let (db, rec, user_id) = setup().await;
    let overdue_a = db.create_pending(overdue_op(user_id, 1_000)).await.unwrap();
    let overdue_b = db.create_pending(overdue_op(user_id, 2_000)).await.unwrap();
    let live = db
        .create_pending(NewPendingOperation::new(
            OperationKind::MpesaDeposit,
            user_id,
            Cents::from(3_000),
            "254722000001",
            chrono::Duration::hours(2),
        ))
        .await
        .unwrap();

    let first = rec.sweep_expired().await.unwrap();
    assert_eq!(first.count(), 2);
    let second = rec.sweep_expired().await.unwrap();
    assert_eq!(second.count(), 0);

    for cid in [&overdue_a.correlation_id, &overdue_b.correlation_id] {
        let op = db.fetch_pending(cid).await.unwrap();
        assert_eq!(op.status, OperationStatus::Expired);
    }
    let op = db.fetch_pending(&live.correlation_id).await.unwrap();
    assert_eq!(op.status, OperationStatus::Pending);
}

#[tokio::test]
async fn concurrent_sweeps_never_double_expire() {
    let (db, rec, user_id) = setup().await;
    for i in 0..10 {
        db.create_pending(overdue_op(user_id, 1_000 + i)).await.unwrap();
    }
    let rec2 = ReconciliationApi::new(
        db.clone(),
        Arc::new(ReadCache::new(std::time::Duration::from_secs(60))),
        EventProducers::default(),
    );
    let (a, b) = tokio::join!(rec.sweep_expired(), rec2.sweep_expired());
    let total = a.unwrap().count() + b.unwrap().count();
    assert_eq!(total, 10);
}

#[tokio::test]
async fn late_webhook_after_expiry_is_a_no_op() {
    let (db, rec, user_id) = setup().await;
    let op = db.create_pending(overdue_op(user_id, 4_000)).await.unwrap();
    rec.sweep_expired().await.unwrap();

    // the confirmation finally arrives, after the sweep already resolved the entry
    let outcome = rec
        .process_payment_callback(PaymentCallback {
            correlation_id: op.correlation_id.clone(),
            result_code: 0,
            result_description: "Success".to_string(),
            settled_amount: Some(4_000),
            phone: None,
        })
        .await
        .unwrap();
    assert!(outcome.is_none());

    let balance = db.fetch_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(0));
    let history = db.fetch_transactions(user_id, Pagination::default()).await.unwrap();
    assert!(history.is_empty());
    let resolved = db.fetch_pending(&op.correlation_id).await.unwrap();
    assert_eq!(resolved.status, OperationStatus::Expired);
}
