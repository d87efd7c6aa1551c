use akiba_common::Cents;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

//----------------------------------------- Request payloads ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserParams {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindWalletParams {
    pub address: String,
    pub nonce: u64,
    pub public_key: String,
    pub signature: String,
}

/// How a deposit or withdrawal moves: through the mobile-money rail, or as a pre-signed on-chain transfer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethodParams {
    Mpesa { phone: String },
    Crypto { raw_tx: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositParams {
    pub user_id: i64,
    pub amount: i64,
    #[serde(flatten)]
    pub method: PaymentMethodParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalParams {
    pub user_id: i64,
    pub amount: i64,
    #[serde(flatten)]
    pub method: PaymentMethodParams,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGoalParams {
    pub user_id: i64,
    pub name: String,
    pub target_amount: i64,
    pub duration_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContributeParams {
    pub user_id: i64,
    pub goal_id: i64,
    pub amount: i64,
    pub raw_tx: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatusChange {
    Active,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalStatusParams {
    pub status: GoalStatusChange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPageQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

//----------------------------------------- Response payloads --------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PendingOperationResponse {
    pub correlation_id: String,
    pub kind: String,
    pub status: String,
    pub amount: Cents,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<akiba_engine::db_types::PendingOperation> for PendingOperationResponse {
    fn from(op: akiba_engine::db_types::PendingOperation) -> Self {
        Self {
            correlation_id: op.correlation_id.to_string(),
            kind: op.kind.to_string(),
            status: op.status.to_string(),
            amount: op.amount,
            expires_at: op.expires_at,
        }
    }
}
