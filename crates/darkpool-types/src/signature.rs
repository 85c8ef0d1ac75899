//! Signature recovery capability.
//!
//! The core never verifies curves itself. It asks a [`SignatureVerifier`]
//! which address produced a signature over a message, and compares that to
//! the address it expects.
//!
//! [`Ed25519Verifier`] is the production implementation. Ed25519 has no
//! public-key recovery, so a signature blob carries the public key in front
//! of the signature: `public_key (32) || signature (64)`. The signer's
//! address is derived from that public key with [`address_from_public_key`].

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::{Address, Amount, DarkpoolError, OrderId, Result, constants};

/// Length of an ed25519 signature blob (public key + signature).
pub const SIGNATURE_BLOB_LEN: usize = 96;

/// Recovers the signer of a message.
pub trait SignatureVerifier {
    /// Return the address that signed `message`, or an error if the
    /// signature is malformed or does not verify.
    fn recover(&self, message: &[u8], signature: &[u8]) -> Result<Address>;
}

/// Derive an account address from an ed25519 public key: the last 20 bytes
/// of `SHA-256(public_key)`.
#[must_use]
pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let hash = Sha256::digest(public_key);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address(bytes)
}

/// Ed25519-backed signature recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn recover(&self, message: &[u8], signature: &[u8]) -> Result<Address> {
        if signature.len() != SIGNATURE_BLOB_LEN {
            return Err(DarkpoolError::InvalidSignature {
                reason: format!(
                    "expected {SIGNATURE_BLOB_LEN} bytes, got {}",
                    signature.len()
                ),
            });
        }
        let (key_bytes, sig_bytes) = signature.split_at(32);

        let mut key = [0u8; 32];
        key.copy_from_slice(key_bytes);
        let verifying_key =
            VerifyingKey::from_bytes(&key).map_err(|e| DarkpoolError::InvalidSignature {
                reason: e.to_string(),
            })?;

        let mut sig = [0u8; 64];
        sig.copy_from_slice(sig_bytes);
        let sig = Signature::from_bytes(&sig);

        verifying_key
            .verify(message, &sig)
            .map_err(|e| DarkpoolError::InvalidSignature {
                reason: e.to_string(),
            })?;

        Ok(address_from_public_key(&key))
    }
}

// ---------------------------------------------------------------------------
// Signed messages
// ---------------------------------------------------------------------------

/// Message a trader signs to open an order.
#[must_use]
pub fn open_message(order_id: &OrderId) -> Vec<u8> {
    [constants::OPEN_MESSAGE_PREFIX, order_id.as_bytes().as_slice()].concat()
}

/// Message a trader signs to cancel an order.
#[must_use]
pub fn cancel_message(order_id: &OrderId) -> Vec<u8> {
    [constants::CANCEL_MESSAGE_PREFIX, order_id.as_bytes().as_slice()].concat()
}

/// Message a broker signs to authorize a trader's withdrawal.
///
/// The trader's current nonce is part of the message so each authorization
/// can be consumed once.
#[must_use]
pub fn withdraw_message(trader: &Address, nonce: Amount) -> Vec<u8> {
    let mut nonce_bytes = [0u8; 32];
    nonce.to_big_endian(&mut nonce_bytes);
    [
        constants::WITHDRAW_MESSAGE_PREFIX,
        trader.as_bytes().as_slice(),
        nonce_bytes.as_slice(),
    ]
    .concat()
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Deterministic ed25519 signer for tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone)]
pub struct TestSigner {
    key: ed25519_dalek::SigningKey,
}

#[cfg(any(test, feature = "test-helpers"))]
impl TestSigner {
    /// Signer whose secret key is 32 copies of `seed`.
    pub fn from_seed(seed: u8) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(&[seed; 32]),
        }
    }

    /// The address [`Ed25519Verifier`] recovers for this signer.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.key.verifying_key().to_bytes())
    }

    /// Produce a `public_key || signature` blob over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer;
        let sig = self.key.sign(message);
        [
            self.key.verifying_key().to_bytes().as_slice(),
            sig.to_bytes().as_slice(),
        ]
        .concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_signer_address() {
        let signer = TestSigner::from_seed(7);
        let msg = open_message(&OrderId([1u8; 32]));
        let sig = signer.sign(&msg);
        assert_eq!(sig.len(), SIGNATURE_BLOB_LEN);
        assert_eq!(Ed25519Verifier.recover(&msg, &sig).unwrap(), signer.address());
    }

    #[test]
    fn wrong_message_fails() {
        let signer = TestSigner::from_seed(7);
        let id = OrderId([1u8; 32]);
        let sig = signer.sign(&open_message(&id));
        let err = Ed25519Verifier.recover(&cancel_message(&id), &sig).unwrap_err();
        assert!(matches!(err, DarkpoolError::InvalidSignature { .. }));
    }

    #[test]
    fn swapped_public_key_fails() {
        let alice = TestSigner::from_seed(1);
        let bob = TestSigner::from_seed(2);
        let msg = b"hello";
        let mut sig = alice.sign(msg);
        let bob_sig = bob.sign(msg);
        sig[..32].copy_from_slice(&bob_sig[..32]);
        assert!(Ed25519Verifier.recover(msg, &sig).is_err());
    }

    #[test]
    fn malformed_length_fails() {
        assert!(Ed25519Verifier.recover(b"m", &[0u8; 10]).is_err());
        assert!(Ed25519Verifier.recover(b"m", &[]).is_err());
    }

    #[test]
    fn withdraw_message_binds_nonce() {
        let trader = Address::derived("trader");
        assert_ne!(
            withdraw_message(&trader, Amount::zero()),
            withdraw_message(&trader, Amount::one())
        );
    }

    #[test]
    fn distinct_seeds_distinct_addresses() {
        assert_ne!(TestSigner::from_seed(1).address(), TestSigner::from_seed(2).address());
    }
}
