use serde::{Deserialize, Serialize};

use crate::db_types::{Goal, TransactionRecord};

pub use crate::traits::Pagination;

/// One page of a user's movement history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionList {
    pub transactions: Vec<TransactionRecord>,
    pub page: u32,
    pub limit: u32,
}

impl TransactionList {
    pub fn new(transactions: Vec<TransactionRecord>, pagination: Pagination) -> Self {
        Self { transactions, page: pagination.page, limit: pagination.limit }
    }
}

/// A goal together with its derived progress, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress_pct: u8,
}

impl From<Goal> for GoalView {
    fn from(goal: Goal) -> Self {
        let target = goal.target_amount.value().max(1);
        let pct = (goal.current_amount.value().clamp(0, target) * 100) / target;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let progress_pct = pct as u8;
        Self { goal, progress_pct }
    }
}
