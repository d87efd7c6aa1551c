use akiba_common::Cents;
use serde::{Deserialize, Serialize};

use crate::db_types::{Goal, PendingOperation, TransactionRecord};

//--------------------------------------      Pagination     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, limit: 50 }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        // a limit of 0 would silently return nothing; treat it as "use the default page size"
        let limit = if limit == 0 { 50 } else { limit.min(500) };
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.limit)
    }
}

//--------------------------------------       GoalRef       ---------------------------------------------------------
/// Identifies a goal either by the local row id, or by the id the on-chain contract assigned to it. Ledger events
/// only carry the chain id; API callers use the local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalRef {
    Local(i64),
    Chain(i64),
}

//--------------------------------------      Settlement     ---------------------------------------------------------
/// The durable result of applying one confirmation: the terminal pending operation (when one was matched), the
/// transaction that records the movement, the post-mutation balance, and the goal when the movement touched one.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub operation: Option<PendingOperation>,
    pub transaction: TransactionRecord,
    pub new_balance: Cents,
    pub goal: Option<Goal>,
}

/// Outcome of a settle call. Duplicate deliveries surface as `AlreadyTerminal` so that callers can treat them as a
/// harmless no-op instead of an error.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Applied(Settlement),
    AlreadyTerminal(PendingOperation),
}

//--------------------------------------      SweepResult    ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub expired: Vec<PendingOperation>,
}

impl SweepResult {
    pub fn count(&self) -> usize {
        self.expired.len()
    }
}
