//! Ledger relay client
//!
//! Implements the [`LedgerClient`] boundary against the transaction relay, an HTTP service that submits pre-signed
//! transactions to the savings contract and exposes the contract's event log. Keeping the relay behind this trait
//! means the engine never sees chain plumbing, and this backend never sees a private key.
use akiba_common::Cents;
use akiba_engine::{
    db_types::WalletAddress,
    ledger::{LedgerClient, LedgerError, LedgerEventRecord, SignedSubmission},
};
use log::*;
use serde_json::{json, Value};

use crate::config::LedgerConfig;

#[derive(Clone)]
pub struct LedgerRelayClient {
    config: LedgerConfig,
    client: reqwest::Client,
}

impl LedgerRelayClient {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value, LedgerError> {
        let url = format!("{}{path}", self.config.relay_url);
        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", self.config.api_key.reveal())
            .json(&payload)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !status.is_success() {
            let reason = body.get("error").and_then(Value::as_str).unwrap_or("relay rejected the call").to_string();
            return Err(LedgerError::Rejected(reason));
        }
        Ok(body)
    }

    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        let url = format!("{}{path}", self.config.relay_url);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", self.config.api_key.reveal())
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!("relay returned {}", response.status())));
        }
        response.json().await.map_err(|e| LedgerError::Transport(e.to_string()))
    }

    fn tx_hash_from(body: &Value) -> Result<String, LedgerError> {
        body.get("txHash")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| LedgerError::Rejected("Relay response did not contain txHash".to_string()))
    }
}

impl LedgerClient for LedgerRelayClient {
    async fn deposit(&self, amount: Cents, signed: &SignedSubmission) -> Result<String, LedgerError> {
        let body = self
            .post("/transactions", json!({ "kind": "deposit", "amount": amount.value(), "rawTx": signed.raw_tx }))
            .await?;
        let tx_hash = Self::tx_hash_from(&body)?;
        debug!("🔗️ Deposit of {amount} submitted as {tx_hash}");
        Ok(tx_hash)
    }

    async fn withdraw(&self, amount: Cents, signed: &SignedSubmission) -> Result<String, LedgerError> {
        let body = self
            .post("/transactions", json!({ "kind": "withdrawal", "amount": amount.value(), "rawTx": signed.raw_tx }))
            .await?;
        let tx_hash = Self::tx_hash_from(&body)?;
        debug!("🔗️ Withdrawal of {amount} submitted as {tx_hash}");
        Ok(tx_hash)
    }

    async fn create_goal(&self, name: &str, target_amount: Cents, duration_days: u32) -> Result<i64, LedgerError> {
        let body = self
            .post(
                "/goals",
                json!({ "name": name, "targetAmount": target_amount.value(), "durationDays": duration_days }),
            )
            .await?;
        body.get("goalId")
            .and_then(Value::as_i64)
            .ok_or_else(|| LedgerError::Rejected("Relay response did not contain goalId".to_string()))
    }

    async fn contribute_to_goal(
        &self,
        goal_id: i64,
        amount: Cents,
        signed: &SignedSubmission,
    ) -> Result<String, LedgerError> {
        let body = self
            .post(
                "/transactions",
                json!({ "kind": "goal-contribution", "goalId": goal_id, "amount": amount.value(), "rawTx": signed.raw_tx }),
            )
            .await?;
        Self::tx_hash_from(&body)
    }

    async fn get_balance(&self, address: &WalletAddress) -> Result<Cents, LedgerError> {
        let body = self.get(&format!("/balance/{address}")).await?;
        body.get("amount")
            .and_then(Value::as_i64)
            .map(Cents::from)
            .ok_or_else(|| LedgerError::Transport("Balance response did not contain amount".to_string()))
    }

    async fn poll_events(&self, after_block: u64) -> Result<Vec<LedgerEventRecord>, LedgerError> {
        let body = self.get(&format!("/events?afterBlock={after_block}")).await?;
        let records = serde_json::from_value::<Vec<LedgerEventRecord>>(body)
            .map_err(|e| LedgerError::InvalidEvent(e.to_string()))?;
        trace!("🔗️ Polled {} ledger events after block {after_block}", records.len());
        Ok(records)
    }
}
