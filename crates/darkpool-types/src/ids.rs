//! Identifiers used throughout the darkpool.
//!
//! Accounts and components are addressed by 20-byte [`Address`]es, orders
//! by the 32-byte content hash [`OrderId`], and tokens by the compact
//! [`TokenCode`] assigned in the token registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{DarkpoolError, Result};

/// Block height. The only clock the core knows about.
pub type BlockNumber = u64;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address (traders, brokers, darknodes, components).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Never a valid owner or signer.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Sentinel used for the native coin (`0xEeee…EEeE`).
    pub const ETHEREUM: Self = Self([
        0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee,
        0xee, 0xee, 0xee, 0xee, 0xee,
    ]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Deterministic address for a named component (`"orderbook"`, ...).
    ///
    /// Used to give in-process components a stable identity that can hold
    /// tokens and be checked as a caller.
    #[must_use]
    pub fn derived(label: &str) -> Self {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest([b"darkpool:address:v1:".as_slice(), label.as_bytes()].concat());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = DarkpoolError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| DarkpoolError::Serialization(format!("address {s}: {e}")))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| {
            DarkpoolError::Serialization(format!("address {s}: expected 20 bytes"))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Content hash identifying an order. See [`crate::OrderDetails::order_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Compact numeric code of a registered token. Code `0` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TokenCode(pub u32);

impl fmt::Display for TokenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

/// A pair of token codes packed into 64 bits.
///
/// The high 32 bits are the priority token (the one the buyer pays with),
/// the low 32 bits the secondary token (the one being bought).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TokenPair(pub u64);

impl TokenPair {
    #[must_use]
    pub fn new(priority: TokenCode, secondary: TokenCode) -> Self {
        Self((u64::from(priority.0) << 32) | u64::from(secondary.0))
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn priority(self) -> TokenCode {
        TokenCode((self.0 >> 32) as u32)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn secondary(self) -> TokenCode {
        TokenCode(self.0 as u32)
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.priority().0, self.secondary().0)
    }
}

/// Identifies which settlement layer is responsible for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SettlementId(pub u64);

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "settlement:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
