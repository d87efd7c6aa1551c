//! Settlement notification dispatcher
//!
//! Fire-and-forget SMS notifications on terminal state transitions. Delivery failures are logged and swallowed
//! here; they never propagate back to the reconciliation engine, and they never roll back a settlement.
use std::fmt::Display;

use log::*;
use serde_json::json;

use crate::config::NotifierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    DepositCompleted,
    WithdrawalCompleted,
    OperationFailed,
    OperationExpired,
    GoalReached,
}

impl Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateKind::DepositCompleted => write!(f, "deposit_completed"),
            TemplateKind::WithdrawalCompleted => write!(f, "withdrawal_completed"),
            TemplateKind::OperationFailed => write!(f, "operation_failed"),
            TemplateKind::OperationExpired => write!(f, "operation_expired"),
            TemplateKind::GoalReached => write!(f, "goal_reached"),
        }
    }
}

#[derive(Clone)]
pub struct SmsNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
}

impl SmsNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    /// Sends one templated notification to the user's phone. Message rendering is the notification service's
    /// concern; this backend only names the template and supplies its parameters.
    pub async fn notify(&self, phone: &str, template: TemplateKind, params: &[(&str, String)]) {
        if self.config.sms_url.is_empty() {
            info!("📣️ [{template}] notification for {phone} (SMS gateway not configured)");
            return;
        }
        let params: serde_json::Map<String, serde_json::Value> =
            params.iter().map(|(k, v)| ((*k).to_string(), json!(v))).collect();
        let payload = json!({
            "to": phone,
            "from": self.config.sender_id,
            "template": template.to_string(),
            "params": params,
        });
        let result = self
            .client
            .post(&self.config.sms_url)
            .header("X-Api-Key", self.config.api_key.reveal())
            .json(&payload)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("📣️ [{template}] notification for {phone} dispatched");
            },
            Ok(response) => {
                warn!("📣️ SMS gateway returned {} for [{template}] notification to {phone}", response.status());
            },
            Err(e) => {
                warn!("📣️ Could not dispatch [{template}] notification to {phone}: {e}");
            },
        }
    }
}
