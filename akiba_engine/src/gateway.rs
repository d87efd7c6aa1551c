//! The mobile-money gateway boundary
//!
//! [`PaymentGateway`] is the call side (push a deposit request to the user's phone, initiate a payout).
//! [`PaymentCallback`] is the wire shape of the provider's asynchronous webhook, delivered at-least-once over plain
//! HTTP POST. The provider does not sign callbacks, so the payload is untrusted input that only gains meaning by
//! matching it to a known pending operation's correlation id.
use akiba_common::Cents;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::CorrelationId;

#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    /// Pushes a payment request for `amount` to `phone`. `reference` is our correlation id, echoed back in the
    /// callback when the provider supports it. Returns the provider-assigned correlation id.
    async fn initiate_deposit(
        &self,
        phone: &str,
        amount: Cents,
        reference: &CorrelationId,
    ) -> Result<CorrelationId, GatewayError>;

    /// Initiates a payout of `amount` to `phone`. Returns the provider-assigned correlation id.
    async fn initiate_withdrawal(&self, phone: &str, amount: Cents, remark: &str)
        -> Result<CorrelationId, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment gateway transport error: {0}")]
    Transport(String),
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Payment gateway authentication failed: {0}")]
    Auth(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

//--------------------------------------   PaymentCallback   ---------------------------------------------------------
/// The provider's webhook payload. Field names follow the external contract and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
    #[serde(rename = "resultCode")]
    pub result_code: i64,
    #[serde(rename = "resultDescription")]
    pub result_description: String,
    /// The amount the provider actually settled, in cents. Real-world provider rounding may differ from the
    /// requested amount, so when present this value wins.
    #[serde(rename = "settledAmount", default)]
    pub settled_amount: Option<i64>,
    #[serde(rename = "phone", default)]
    pub phone: Option<String>,
}

impl PaymentCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// The settled amount, trusting the callback's metadata over the originally requested amount.
    pub fn settled_amount_or(&self, requested: Cents) -> Cents {
        self.settled_amount.map(Cents::from).unwrap_or(requested)
    }
}

/// The fixed acknowledgement body returned for every webhook delivery, regardless of processing outcome, so the
/// provider never retries indefinitely on backend-side errors it cannot resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self { result_code: 0, result_desc: "Accepted".to_string() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_field_names_are_preserved() {
        let json = r#"{
            "correlationId": "ws_CO_123",
            "resultCode": 0,
            "resultDescription": "The service request is processed successfully.",
            "settledAmount": 10000,
            "phone": "254712345678"
        }"#;
        let cb: PaymentCallback = serde_json::from_str(json).expect("callback should deserialize");
        assert!(cb.is_success());
        assert_eq!(cb.correlation_id, CorrelationId::from("ws_CO_123".to_string()));
        assert_eq!(cb.settled_amount_or(Cents::from(0)), Cents::from(10_000));
    }

    #[test]
    fn settled_amount_falls_back_to_requested() {
        let json = r#"{"correlationId": "x", "resultCode": 1032, "resultDescription": "Request cancelled by user"}"#;
        let cb: PaymentCallback = serde_json::from_str(json).expect("callback should deserialize");
        assert!(!cb.is_success());
        assert_eq!(cb.settled_amount_or(Cents::from(500)), Cents::from(500));
    }
}
