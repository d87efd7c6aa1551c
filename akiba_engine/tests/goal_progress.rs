//! Goal progress and completion semantics driven by settled contributions.
mod helpers;

use std::sync::Arc;

use akiba_common::Cents;
use akiba_engine::{
    cache::ReadCache,
    db_types::{GoalStatus, NewGoal, WalletAddress},
    events::EventProducers,
    ledger::{ChainEvent, LedgerEventKind},
    traits::{ProjectionReads, ReconciliationDatabase, UserManagement},
    ReconciliationApi,
    SqliteDatabase,
};
use helpers::{prepare_test_env, random_db_path};

async fn setup() -> (SqliteDatabase, ReconciliationApi<SqliteDatabase>, i64, WalletAddress) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let cache = Arc::new(ReadCache::new(std::time::Duration::from_secs(60)));
    let rec = ReconciliationApi::new(db.clone(), cache, EventProducers::default());
    let user = db.create_user("254711000001").await.unwrap();
    let wallet = WalletAddress::from("11b2c3d4e5f60708090a0b0c0d0e0f1011121314");
    db.bind_wallet(user.id, &wallet).await.unwrap();
    (db, rec, user.id, wallet)
}

fn contribution(wallet: &WalletAddress, chain_goal_id: i64, amount: i64, tx_hash: &str) -> ChainEvent {
    ChainEvent {
        kind: LedgerEventKind::GoalContributed,
        user: wallet.clone(),
        amount: Cents::from(amount),
        goal_id: Some(chain_goal_id),
        tx_hash: tx_hash.to_string(),
        log_index: 0,
        block_number: 500,
    }
}

#[tokio::test]
async fn goal_completes_exactly_once_at_the_delta_that_reaches_the_target() {
    let (db, rec, user_id, wallet) = setup().await;
    let goal =
        db.create_goal(NewGoal::new(user_id, "New roof", Cents::from(50_000)).on_chain(77)).await.unwrap();

    // 450 of 500 saved
    rec.process_ledger_event(contribution(&wallet, 77, 45_000, "0xg1")).await.unwrap();
    let progress = db.fetch_goal(user_id, goal.id).await.unwrap();
    assert_eq!(progress.current_amount, Cents::from(45_000));
    assert_eq!(progress.status, GoalStatus::Active);
    assert!(progress.completed_at.is_none());

    // the contribution that crosses the target flips the goal, once, and normalizes the overshoot
    let outcome = rec.process_ledger_event(contribution(&wallet, 77, 10_000, "0xg2")).await.unwrap().unwrap();
    let completed = outcome.goal.expect("settlement reports the goal");
    assert_eq!(completed.status, GoalStatus::Completed);
    assert_eq!(completed.current_amount, Cents::from(50_000));
    assert!(completed.completed_at.is_some());
    let completed_at = completed.completed_at;

    // a straggler contribution settles against the balance but leaves the completed goal untouched
    rec.process_ledger_event(contribution(&wallet, 77, 1_000, "0xg3")).await.unwrap();
    let after = db.fetch_goal(user_id, goal.id).await.unwrap();
    assert_eq!(after.status, GoalStatus::Completed);
    assert_eq!(after.current_amount, Cents::from(50_000));
    assert_eq!(after.completed_at, completed_at);

    // all three contributions credited the custodial balance
    let balance = db.fetch_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, Cents::from(56_000));
}

#[tokio::test]
async fn externally_created_goal_is_synthesized_locally() {
    let (db, rec, user_id, wallet) = setup().await;
    let event = ChainEvent {
        kind: LedgerEventKind::GoalCreated,
        user: wallet.clone(),
        amount: Cents::from(80_000),
        goal_id: Some(901),
        tx_hash: "0xg10".to_string(),
        log_index: 0,
        block_number: 600,
    };
    rec.process_ledger_event(event.clone()).await.unwrap();
    let goal = db.fetch_goal_by_chain_id(901).await.unwrap().expect("goal record was synthesized");
    assert_eq!(goal.user_id, user_id);
    assert_eq!(goal.target_amount, Cents::from(80_000));
    assert_eq!(goal.status, GoalStatus::Active);

    // redelivery does not create a second record
    rec.process_ledger_event(event).await.unwrap();
    let goals = db.fetch_goals_for_user(user_id).await.unwrap();
    assert_eq!(goals.len(), 1);
}

#[tokio::test]
async fn goal_lifecycle_transitions_are_guarded() {
    let (db, _rec, user_id, _wallet) = setup().await;
    let goal = db.create_goal(NewGoal::new(user_id, "Emergency fund", Cents::from(10_000))).await.unwrap();

    let paused = db.set_goal_status(user_id, goal.id, GoalStatus::Paused).await.unwrap();
    assert_eq!(paused.status, GoalStatus::Paused);
    let resumed = db.set_goal_status(user_id, goal.id, GoalStatus::Active).await.unwrap();
    assert_eq!(resumed.status, GoalStatus::Active);
    let cancelled = db.set_goal_status(user_id, goal.id, GoalStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.status, GoalStatus::Cancelled);

    // cancelled is terminal
    assert!(db.set_goal_status(user_id, goal.id, GoalStatus::Active).await.is_err());
    // completion is never a status-change request
    let other = db.create_goal(NewGoal::new(user_id, "Bike", Cents::from(5_000))).await.unwrap();
    assert!(db.set_goal_status(user_id, other.id, GoalStatus::Completed).await.is_err());
}
