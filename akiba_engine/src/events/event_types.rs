use serde::{Deserialize, Serialize};

use crate::db_types::{Goal, PendingOperation, TransactionRecord};

/// Emitted whenever an operation reaches a terminal state: a settlement applied, a failure recorded, or a pending
/// entry swept past its deadline. This is the engine's only outward signal; the server wires it to the notification
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub user_id: i64,
    pub outcome: SettlementKind,
    pub transaction: Option<TransactionRecord>,
    pub operation: Option<PendingOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementKind {
    Completed,
    Failed,
    Expired,
}

impl SettlementEvent {
    pub fn completed(user_id: i64, transaction: TransactionRecord) -> Self {
        Self { user_id, outcome: SettlementKind::Completed, transaction: Some(transaction), operation: None }
    }

    pub fn failed(user_id: i64, transaction: TransactionRecord) -> Self {
        Self { user_id, outcome: SettlementKind::Failed, transaction: Some(transaction), operation: None }
    }

    pub fn expired(operation: PendingOperation) -> Self {
        Self { user_id: operation.user_id, outcome: SettlementKind::Expired, transaction: None, operation: Some(operation) }
    }

    pub fn with_operation(mut self, operation: PendingOperation) -> Self {
        self.operation = Some(operation);
        self
    }
}

/// Emitted when a goal flips to `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalReachedEvent {
    pub goal: Goal,
}

impl GoalReachedEvent {
    pub fn new(goal: Goal) -> Self {
        Self { goal }
    }
}
