use std::{fmt::Display, str::FromStr};

use akiba_common::Cents;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------    CorrelationId    ---------------------------------------------------------
/// Opaque identifier linking an initiated request to its eventual asynchronous confirmation. Either assigned by the
/// payment provider, or self-generated before the external call is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// A fresh random correlation id. Used so that a pending operation can be durably recorded before the external
    /// system has assigned its own reference.
    pub fn random() -> Self {
        let n: u128 = rand::random();
        Self(format!("akb-{n:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CorrelationId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------    WalletAddress    ---------------------------------------------------------
/// A lightweight wrapper around the hex string form of an on-chain account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Addresses arrive from the chain in mixed case; comparisons and storage always use the lowercase form.
    pub fn normalized(&self) -> WalletAddress {
        WalletAddress(self.0.to_ascii_lowercase())
    }
}

impl<S: Into<String>> From<S> for WalletAddress {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     OperationKind   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OperationKind {
    /// Tokens moved into the savings contract from the user's wallet.
    CryptoDeposit,
    /// Tokens moved out of the savings contract to the user's wallet.
    CryptoWithdrawal,
    /// Mobile-money deposit pushed to the user's phone for approval.
    MpesaDeposit,
    /// Mobile-money payout to the user's phone.
    MpesaWithdrawal,
    /// A contribution towards a savings goal.
    GoalContribution,
}

impl OperationKind {
    /// Whether settlement of this operation credits (+) or debits (-) the user's balance. Goal contributions pull
    /// fresh funds into the savings contract, so they credit the custodial balance as well as the goal.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            OperationKind::CryptoDeposit | OperationKind::MpesaDeposit | OperationKind::GoalContribution
        )
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::CryptoDeposit => write!(f, "CryptoDeposit"),
            OperationKind::CryptoWithdrawal => write!(f, "CryptoWithdrawal"),
            OperationKind::MpesaDeposit => write!(f, "MpesaDeposit"),
            OperationKind::MpesaWithdrawal => write!(f, "MpesaWithdrawal"),
            OperationKind::GoalContribution => write!(f, "GoalContribution"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CryptoDeposit" => Ok(Self::CryptoDeposit),
            "CryptoWithdrawal" => Ok(Self::CryptoWithdrawal),
            "MpesaDeposit" => Ok(Self::MpesaDeposit),
            "MpesaWithdrawal" => Ok(Self::MpesaWithdrawal),
            "GoalContribution" => Ok(Self::GoalContribution),
            s => Err(ConversionError(format!("Invalid operation kind: {s}"))),
        }
    }
}

impl From<String> for OperationKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid operation kind: {value}. But this conversion cannot fail. Defaulting to MpesaDeposit");
            OperationKind::MpesaDeposit
        })
    }
}

//--------------------------------------   OperationStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OperationStatus {
    /// The external call has been dispatched and no confirmation has arrived yet.
    Pending,
    /// The matching confirmation arrived and the balance mutation was applied.
    Completed,
    /// The external system reported failure, or the dispatch itself failed.
    Failed,
    /// The expiry deadline passed without a confirmation.
    Expired,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

impl Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "Pending"),
            OperationStatus::Completed => write!(f, "Completed"),
            OperationStatus::Failed => write!(f, "Failed"),
            OperationStatus::Expired => write!(f, "Expired"),
        }
    }
}

impl FromStr for OperationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Expired" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid operation status: {s}"))),
        }
    }
}

impl From<String> for OperationStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid operation status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OperationStatus::Pending
        })
    }
}

//--------------------------------------   PendingOperation  ---------------------------------------------------------
/// One in-flight external call. Created when the call is dispatched, transitioned exactly once by the reconciliation
/// engine when the matching confirmation arrives (or by the expiry sweep), and retained afterwards as an audit trail.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: i64,
    pub correlation_id: CorrelationId,
    pub kind: OperationKind,
    pub user_id: i64,
    pub amount: Cents,
    /// The wallet address or phone number the operation settles against.
    pub target: String,
    pub goal_id: Option<i64>,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPendingOperation {
    pub correlation_id: CorrelationId,
    pub kind: OperationKind,
    pub user_id: i64,
    pub amount: Cents,
    pub target: String,
    pub goal_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

impl NewPendingOperation {
    pub fn new(kind: OperationKind, user_id: i64, amount: Cents, target: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            correlation_id: CorrelationId::random(),
            kind,
            user_id,
            amount,
            target: target.into(),
            goal_id: None,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn with_goal(mut self, goal_id: i64) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }
}

//--------------------------------------    TransactionKind  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Failed");
            TransactionStatus::Failed
        })
    }
}

//--------------------------------------      Transaction    ---------------------------------------------------------
/// An immutable record of a completed or failed money movement. Created exclusively by the reconciliation engine at
/// the moment a pending operation reaches a terminal state, or directly for on-chain events with no corresponding
/// pending operation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: OperationKind,
    pub status: TransactionStatus,
    pub amount: Cents,
    /// Chain `txhash:logindex` or provider receipt number. Unique when present; this is the idempotence guard
    /// against redelivered events.
    pub external_ref: Option<String>,
    pub description: Option<String>,
    pub pending_op_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub kind: OperationKind,
    pub status: TransactionStatus,
    pub amount: Cents,
    pub external_ref: Option<String>,
    pub description: Option<String>,
    pub pending_op_id: Option<i64>,
}

impl NewTransaction {
    pub fn new(user_id: i64, kind: OperationKind, status: TransactionStatus, amount: Cents) -> Self {
        Self { user_id, kind, status, amount, external_ref: None, description: None, pending_op_id: None }
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn for_pending_op(mut self, op: &PendingOperation) -> Self {
        self.pending_op_id = Some(op.id);
        self
    }
}

//--------------------------------------      GoalStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum GoalStatus {
    Active,
    Completed,
    Cancelled,
    Paused,
}

impl Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalStatus::Active => write!(f, "Active"),
            GoalStatus::Completed => write!(f, "Completed"),
            GoalStatus::Cancelled => write!(f, "Cancelled"),
            GoalStatus::Paused => write!(f, "Paused"),
        }
    }
}

impl FromStr for GoalStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Paused" => Ok(Self::Paused),
            s => Err(ConversionError(format!("Invalid goal status: {s}"))),
        }
    }
}

impl From<String> for GoalStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid goal status: {value}. But this conversion cannot fail. Defaulting to Active");
            GoalStatus::Active
        })
    }
}

//--------------------------------------        Goal         ---------------------------------------------------------
/// A savings target. `current_amount` only ever grows while the goal is active, and the `Active -> Completed`
/// transition is one-way, taken at the contribution that first reaches the target.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub target_amount: Cents,
    pub current_amount: Cents,
    pub status: GoalStatus,
    pub deadline: Option<DateTime<Utc>>,
    /// The goal id assigned by the on-chain savings contract, when the goal is mirrored there.
    pub chain_goal_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn is_reached(&self) -> bool {
        self.current_amount >= self.target_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub user_id: i64,
    pub name: String,
    pub target_amount: Cents,
    pub deadline: Option<DateTime<Utc>>,
    pub chain_goal_id: Option<i64>,
}

impl NewGoal {
    pub fn new(user_id: i64, name: impl Into<String>, target_amount: Cents) -> Self {
        Self { user_id, name: name.into(), target_amount, deadline: None, chain_goal_id: None }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn on_chain(mut self, chain_goal_id: i64) -> Self {
        self.chain_goal_id = Some(chain_goal_id);
        self
    }
}

//--------------------------------------  BalanceProjection  ---------------------------------------------------------
/// The custodial view of a user's savings balance, derived by folding completed transactions. Never mutated by
/// request handlers; the reconciliation engine is the sole writer.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct BalanceProjection {
    pub user_id: i64,
    pub balance: Cents,
    pub total_deposited: Cents,
    pub total_withdrawn: Cents,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        User         ---------------------------------------------------------
/// Identity plus at most one on-chain address binding. Never hard-deleted; `active` is flipped off instead.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone: String,
    pub wallet_address: Option<WalletAddress>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
