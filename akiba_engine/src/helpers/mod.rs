mod phone;
mod wallet_signature;

pub use phone::{normalize_msisdn, PhoneError};
pub use wallet_signature::{address_for_verifying_key, WalletSignature, WalletSignatureError};
