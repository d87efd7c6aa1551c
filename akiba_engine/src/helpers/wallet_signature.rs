//! # Wallet binding signature format
//!
//! When binding an on-chain address to a user, we cannot let users claim just any address, because this would let
//! folks bind other people's wallets and have externally-initiated deposits credited to their own balance.
//!
//! Users need to _prove_ that they own the address they bind. This is done by signing a message with the wallet's
//! private key, client-side; the backend only ever verifies signatures and never handles key material. The message
//! is constructed from the address, the user id and a nonce (preventing a captured proof from being replayed to
//! bind the same address to a different user).
//!
//! ## Message format
//!
//! The signed challenge is the Blake2b-512 digest of:
//!
//! ```text
//!    {address}:{user_id}:{nonce}
//! ```
//!
//! where `address` is the lowercase hex account address, `user_id` is the decimal user id and `nonce` is a
//! client-chosen number that must increase on every binding attempt.
//!
//! The account address itself is the first 20 bytes of the Blake2b-512 digest of the ed25519 public key, hex
//! encoded, so a valid proof also demonstrates that the claimed address belongs to the presented key.
use blake2::{Blake2b512, Digest};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::WalletAddress;

#[derive(Debug, Clone, Error)]
#[error("Invalid wallet signature: {0}")]
pub struct WalletSignatureError(String);

impl From<String> for WalletSignatureError {
    fn from(e: String) -> Self {
        Self(e)
    }
}

/// Derives the account address for a public key: the first 20 bytes of the Blake2b-512 digest, hex encoded.
pub fn address_for_verifying_key(key: &VerifyingKey) -> WalletAddress {
    let digest = Blake2b512::digest(key.as_bytes());
    WalletAddress::from(hex::encode(&digest[..20]))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSignature {
    pub address: WalletAddress,
    pub user_id: i64,
    pub nonce: u64,
    #[serde(serialize_with = "ser_key", deserialize_with = "de_key")]
    pub public_key: VerifyingKey,
    #[serde(serialize_with = "ser_sig", deserialize_with = "de_sig")]
    pub signature: Signature,
}

impl WalletSignature {
    pub fn create(user_id: i64, nonce: u64, signing_key: &SigningKey) -> Self {
        let public_key = signing_key.verifying_key();
        let address = address_for_verifying_key(&public_key);
        let challenge = signature_challenge(&address, user_id, nonce);
        let signature = signing_key.sign(&challenge);
        Self { address, user_id, nonce, public_key, signature }
    }

    pub fn new(
        address: &str,
        user_id: i64,
        nonce: u64,
        public_key: &str,
        signature: &str,
    ) -> Result<Self, WalletSignatureError> {
        let public_key = hex_to_verifying_key(public_key)?;
        let signature = hex_to_signature(signature)?;
        let address = WalletAddress::from(address).normalized();
        Ok(Self { address, user_id, nonce, public_key, signature })
    }

    pub fn is_valid(&self) -> bool {
        if address_for_verifying_key(&self.public_key) != self.address.normalized() {
            return false;
        }
        let challenge = signature_challenge(&self.address, self.user_id, self.nonce);
        self.public_key.verify(&challenge, &self.signature).is_ok()
    }

    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn signature_challenge(address: &WalletAddress, user_id: i64, nonce: u64) -> Vec<u8> {
    let message = format!("{}:{user_id}:{nonce}", address.normalized());
    Blake2b512::digest(message.as_bytes()).to_vec()
}

fn hex_to_verifying_key(s: &str) -> Result<VerifyingKey, WalletSignatureError> {
    let bytes = hex::decode(s).map_err(|e| WalletSignatureError(format!("Public key is not valid hex. {e}")))?;
    let bytes: [u8; 32] =
        bytes.try_into().map_err(|_| WalletSignatureError("Public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| WalletSignatureError(format!("Invalid public key. {e}")))
}

fn hex_to_signature(s: &str) -> Result<Signature, WalletSignatureError> {
    let bytes = hex::decode(s).map_err(|e| WalletSignatureError(format!("Signature is not valid hex. {e}")))?;
    let bytes: [u8; 64] =
        bytes.try_into().map_err(|_| WalletSignatureError("Signature must be 64 bytes".to_string()))?;
    Ok(Signature::from_bytes(&bytes))
}

fn ser_key<S>(key: &VerifyingKey, s: S) -> Result<S::Ok, S::Error>
where S: serde::Serializer {
    s.serialize_str(&hex::encode(key.as_bytes()))
}

fn de_key<'de, D>(d: D) -> Result<VerifyingKey, D::Error>
where D: serde::Deserializer<'de> {
    let s = String::deserialize(d)?;
    hex_to_verifying_key(&s).map_err(serde::de::Error::custom)
}

fn ser_sig<S>(sig: &Signature, s: S) -> Result<S::Ok, S::Error>
where S: serde::Serializer {
    s.serialize_str(&hex::encode(sig.to_bytes()))
}

fn de_sig<'de, D>(d: D) -> Result<Signature, D::Error>
where D: serde::Deserializer<'de> {
    let s = String::deserialize(d)?;
    hex_to_signature(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod test {
    use super::*;

    fn signing_key() -> SigningKey {
        let bytes: [u8; 32] = [
            0x1d, 0xbb, 0xce, 0x83, 0xde, 0x2b, 0x02, 0x33, 0xc4, 0x04, 0xb9, 0x6b, 0x92, 0x34, 0x23, 0x3b, 0xb3,
            0xce, 0xc5, 0x15, 0x03, 0xe2, 0x12, 0x4d, 0x8c, 0x72, 0x8a, 0x2d, 0x9b, 0x4f, 0xb0, 0x0c,
        ];
        SigningKey::from_bytes(&bytes)
    }

    #[test]
    fn create_and_verify() {
        let sig = WalletSignature::create(42, 1, &signing_key());
        assert_eq!(sig.user_id, 42);
        assert!(sig.is_valid());
    }

    #[test]
    fn round_trips_through_json() {
        let sig = WalletSignature::create(7, 99, &signing_key());
        let json = sig.as_json();
        let parsed = serde_json::from_str::<WalletSignature>(&json).expect("Failed to deserialize wallet signature");
        assert!(parsed.is_valid());
        assert_eq!(parsed.address, sig.address);
        assert_eq!(parsed.nonce, 99);
    }

    #[test]
    fn tampered_user_id_fails() {
        let mut sig = WalletSignature::create(7, 1, &signing_key());
        sig.user_id = 8;
        assert!(!sig.is_valid());
    }

    #[test]
    fn claimed_address_must_match_key() {
        let mut sig = WalletSignature::create(7, 1, &signing_key());
        sig.address = WalletAddress::from("00000000000000000000000000000000000000ff");
        assert!(!sig.is_valid());
    }
}
