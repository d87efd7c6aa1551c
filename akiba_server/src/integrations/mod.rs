pub mod ledger_relay;
pub mod mpesa;
pub mod notifier;

pub use ledger_relay::LedgerRelayClient;
pub use mpesa::MpesaGateway;
pub use notifier::{SmsNotifier, TemplateKind};
