//! M-Pesa gateway client
//!
//! Implements the [`PaymentGateway`] boundary against a Daraja-style mobile-money API: an OAuth token fetch, an STK
//! push for deposits, and a B2C payment request for payouts. The provider reports outcomes asynchronously through
//! the webhook; the correlation id returned here is what the callback is matched on.
use akiba_common::Cents;
use akiba_engine::{
    db_types::CorrelationId,
    gateway::{GatewayError, PaymentGateway},
};
use chrono::Utc;
use log::*;
use serde_json::{json, Value};

use crate::config::MpesaConfig;

#[derive(Clone)]
pub struct MpesaGateway {
    config: MpesaConfig,
    client: reqwest::Client,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    /// Fetches a short-lived OAuth bearer token using the consumer key/secret pair.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let credentials =
            base64::encode(format!("{}:{}", self.config.consumer_key, self.config.consumer_secret.reveal()));
        let url = format!("{}/oauth/v1/generate?grant_type=client_credentials", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Basic {credentials}"))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Auth(format!("Token request returned {}", response.status())));
        }
        let body: Value = response.json().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| GatewayError::Auth("Token response did not contain access_token".to_string()))
    }

    fn password(&self, timestamp: &str) -> String {
        base64::encode(format!("{}{}{timestamp}", self.config.shortcode, self.config.passkey.reveal()))
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value, GatewayError> {
        let token = self.access_token().await?;
        let url = format!("{}{path}", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            let description = body
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or("The provider rejected the request")
                .to_string();
            return Err(GatewayError::Rejected(description));
        }
        Ok(body)
    }
}

impl PaymentGateway for MpesaGateway {
    async fn initiate_deposit(
        &self,
        phone: &str,
        amount: Cents,
        reference: &CorrelationId,
    ) -> Result<CorrelationId, GatewayError> {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        // STK amounts are whole shillings
        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount.value() / 100,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": reference.as_str(),
            "TransactionDesc": "Akiba savings deposit",
        });
        let body = self.post("/mpesa/stkpush/v1/processrequest", payload).await?;
        let checkout_id = body
            .get("CheckoutRequestID")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Rejected("Response did not contain CheckoutRequestID".to_string()))?;
        debug!("📲️ STK push for {amount} to {phone} accepted as [{checkout_id}]");
        Ok(CorrelationId::from(checkout_id.to_string()))
    }

    async fn initiate_withdrawal(
        &self,
        phone: &str,
        amount: Cents,
        remark: &str,
    ) -> Result<CorrelationId, GatewayError> {
        let payload = json!({
            "InitiatorName": self.config.shortcode,
            "CommandID": "BusinessPayment",
            "Amount": amount.value() / 100,
            "PartyA": self.config.shortcode,
            "PartyB": phone,
            "Remarks": remark,
            "QueueTimeOutURL": self.config.callback_url,
            "ResultURL": self.config.callback_url,
        });
        let body = self.post("/mpesa/b2c/v1/paymentrequest", payload).await?;
        let conversation_id = body
            .get("ConversationID")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Rejected("Response did not contain ConversationID".to_string()))?;
        debug!("📲️ Payout of {amount} to {phone} accepted as [{conversation_id}]");
        Ok(CorrelationId::from(conversation_id.to_string()))
    }
}
