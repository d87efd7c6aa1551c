//! The on-chain ledger boundary
//!
//! The savings contract is consumed as an opaque ledger with a fixed method/event contract. [`LedgerClient`] is the
//! call side; [`LedgerEventRecord`] is the wire shape of the event subscription, delivered at-least-once and
//! unordered across reconnects. Records are validated into the closed [`ChainEvent`] type at the boundary, so a
//! missing or renamed field fails fast instead of propagating into balance math.
//!
//! Transactions that move user funds arrive pre-signed from the client ([`SignedSubmission`]); this backend never
//! handles raw private keys.
use akiba_common::Cents;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::WalletAddress;

//--------------------------------------   SignedSubmission  ---------------------------------------------------------
/// A transaction signed client-side, carried opaquely to the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedSubmission {
    /// Hex-encoded signed transaction payload.
    pub raw_tx: String,
}

//--------------------------------------     LedgerClient    ---------------------------------------------------------
#[allow(async_fn_in_trait)]
pub trait LedgerClient: Clone {
    /// Submits a pre-signed deposit. Returns the transaction hash; settlement arrives later via the event stream.
    async fn deposit(&self, amount: Cents, signed: &SignedSubmission) -> Result<String, LedgerError>;

    /// Submits a pre-signed withdrawal. Returns the transaction hash.
    async fn withdraw(&self, amount: Cents, signed: &SignedSubmission) -> Result<String, LedgerError>;

    /// Creates a goal on the savings contract. Returns the on-chain goal id.
    async fn create_goal(&self, name: &str, target_amount: Cents, duration_days: u32) -> Result<i64, LedgerError>;

    /// Submits a pre-signed goal contribution. Returns the transaction hash.
    async fn contribute_to_goal(
        &self,
        goal_id: i64,
        amount: Cents,
        signed: &SignedSubmission,
    ) -> Result<String, LedgerError>;

    /// The contract-side balance for the address. Read-only; used for operator reconciliation, never written to
    /// the projection.
    async fn get_balance(&self, address: &WalletAddress) -> Result<Cents, LedgerError>;

    /// Pulls events with a block number greater than `after_block`. Delivery is at-least-once: after a reconnect
    /// the same events may be returned again, and the reconciliation engine's idempotence guard absorbs them.
    async fn poll_events(&self, after_block: u64) -> Result<Vec<LedgerEventRecord>, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Ledger RPC transport error: {0}")]
    Transport(String),
    #[error("The ledger rejected the call: {0}")]
    Rejected(String),
    #[error("Malformed ledger event: {0}")]
    InvalidEvent(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_))
    }
}

//--------------------------------------  LedgerEventRecord  ---------------------------------------------------------
/// The raw wire shape of one contract event. Field names follow the external contract and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEventRecord {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub user: String,
    pub amount: i64,
    #[serde(rename = "goalId", default)]
    pub goal_id: Option<i64>,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex", default)]
    pub log_index: u32,
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
}

//--------------------------------------      ChainEvent     ---------------------------------------------------------
/// A validated contract event. The `tx_hash:log_index` pair is the event's immutable identity and becomes the
/// external reference on the transaction it settles.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub kind: LedgerEventKind,
    pub user: WalletAddress,
    pub amount: Cents,
    pub goal_id: Option<i64>,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEventKind {
    Deposit,
    Withdrawal,
    GoalCreated,
    GoalContributed,
    GoalCompleted,
}

impl ChainEvent {
    /// The natural correlation key: no two distinct events share it, and a redelivered event reproduces it exactly.
    pub fn external_ref(&self) -> String {
        format!("{}:{}", self.tx_hash, self.log_index)
    }

    pub fn is_goal_event(&self) -> bool {
        matches!(
            self.kind,
            LedgerEventKind::GoalCreated | LedgerEventKind::GoalContributed | LedgerEventKind::GoalCompleted
        )
    }
}

impl TryFrom<LedgerEventRecord> for ChainEvent {
    type Error = LedgerError;

    fn try_from(record: LedgerEventRecord) -> Result<Self, Self::Error> {
        let kind = match record.event_type.as_str() {
            "deposit" => LedgerEventKind::Deposit,
            "withdrawal" => LedgerEventKind::Withdrawal,
            "goal-created" => LedgerEventKind::GoalCreated,
            "goal-contributed" => LedgerEventKind::GoalContributed,
            "goal-completed" => LedgerEventKind::GoalCompleted,
            other => return Err(LedgerError::InvalidEvent(format!("Unknown event type '{other}'"))),
        };
        if record.tx_hash.is_empty() {
            return Err(LedgerError::InvalidEvent("Event has an empty txHash".to_string()));
        }
        if record.amount < 0 {
            return Err(LedgerError::InvalidEvent(format!("Event has a negative amount ({})", record.amount)));
        }
        if matches!(kind, LedgerEventKind::GoalCreated | LedgerEventKind::GoalContributed | LedgerEventKind::GoalCompleted)
            && record.goal_id.is_none()
        {
            return Err(LedgerError::InvalidEvent(format!("{} event is missing goalId", record.event_type)));
        }
        Ok(ChainEvent {
            kind,
            user: WalletAddress::from(record.user).normalized(),
            amount: Cents::from(record.amount),
            goal_id: record.goal_id,
            tx_hash: record.tx_hash,
            log_index: record.log_index,
            block_number: record.block_number,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(event_type: &str) -> LedgerEventRecord {
        LedgerEventRecord {
            event_type: event_type.to_string(),
            user: "0xAbCd".to_string(),
            amount: 10_000,
            goal_id: Some(3),
            tx_hash: "0xfeed".to_string(),
            log_index: 2,
            block_number: 1_234,
        }
    }

    #[test]
    fn parses_known_event_types() {
        let ev = ChainEvent::try_from(record("deposit")).unwrap();
        assert_eq!(ev.kind, LedgerEventKind::Deposit);
        assert_eq!(ev.user, WalletAddress::from("0xabcd"));
        assert_eq!(ev.amount, Cents::from(10_000));
        assert_eq!(ev.external_ref(), "0xfeed:2");
    }

    #[test]
    fn rejects_unknown_event_type() {
        assert!(ChainEvent::try_from(record("rebase")).is_err());
    }

    #[test]
    fn goal_events_require_goal_id() {
        let mut r = record("goal-contributed");
        r.goal_id = None;
        assert!(ChainEvent::try_from(r).is_err());
    }

    #[test]
    fn wire_field_names_are_preserved() {
        let json = r#"{
            "eventType": "withdrawal",
            "user": "0xff00",
            "amount": 2500,
            "txHash": "0xdead",
            "logIndex": 0,
            "blockNumber": 99
        }"#;
        let record: LedgerEventRecord = serde_json::from_str(json).expect("event record should deserialize");
        let ev = ChainEvent::try_from(record).unwrap();
        assert_eq!(ev.kind, LedgerEventKind::Withdrawal);
        assert_eq!(ev.goal_id, None);
    }
}
