//! Order types shared by the orderbook and the settlement engine.
//!
//! The orderbook only ever sees an order's hash ([`OrderId`]); the full
//! [`OrderDetails`] reach the settlement engine when the trader submits
//! them, and must hash back to the same ID.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, BlockNumber, OrderId, SettlementId, TokenPair};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderParity {
    Buy,
    Sell,
}

impl OrderParity {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderParity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle state of an order in the orderbook.
///
/// ```text
///   Undefined ──open──▶ Open ──confirm──▶ Confirmed
///                        │
///                        └──cancel──▶ Canceled
/// ```
///
/// `Confirmed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderState {
    Undefined,
    Open,
    Confirmed,
    Canceled,
}

impl OrderState {
    /// Numeric status code used by the combined `get_orders` listing.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Undefined => 0,
            Self::Open => 1,
            Self::Confirmed => 2,
            Self::Canceled => 3,
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "UNDEFINED"),
            Self::Open => write!(f, "OPEN"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// The orderbook's record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub parity: OrderParity,
    pub state: OrderState,
    /// The trader whose signature opened the order.
    pub trader: Address,
    /// The account that submitted the open transaction.
    pub broker: Address,
    /// The darknode that confirmed the order, once confirmed.
    pub confirmer: Option<Address>,
    /// The counterparty order, once confirmed.
    pub matched_order: Option<OrderId>,
    /// Block at which the order was opened.
    pub block_number: BlockNumber,
    /// 1-based opening sequence across the whole book.
    pub priority: u64,
}

/// Full detail of an order, as submitted to the settlement engine.
///
/// `price` and `volume` are fixed-point integers with
/// [`crate::constants::PRICE_DECIMALS`] and [`crate::constants::VOLUME_DECIMALS`]
/// decimals; see [`crate::fixed_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub settlement_id: SettlementId,
    pub tokens: TokenPair,
    pub price: u64,
    pub volume: u64,
    pub minimum_volume: u64,
}

impl OrderDetails {
    /// Compute the order ID for these details under a caller-supplied prefix.
    ///
    /// The prefix carries whatever else the trader commits to (type, expiry,
    /// nonce); the core treats it as opaque bytes.
    ///
    /// Format: `SHA-256("darkpool:order:v1:" || len(prefix) || prefix ||
    /// settlement_id || tokens || price || volume || minimum_volume)`, all
    /// integers big-endian.
    #[must_use]
    pub fn order_id(&self, prefix: &[u8]) -> OrderId {
        let mut hasher = Sha256::new();
        hasher.update(b"darkpool:order:v1:");
        hasher.update((prefix.len() as u64).to_be_bytes());
        hasher.update(prefix);
        hasher.update(self.settlement_id.0.to_be_bytes());
        hasher.update(self.tokens.0.to_be_bytes());
        hasher.update(self.price.to_be_bytes());
        hasher.update(self.volume.to_be_bytes());
        hasher.update(self.minimum_volume.to_be_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        OrderId(id)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl OrderDetails {
    pub fn dummy(tokens: TokenPair, price: u64, volume: u64) -> Self {
        Self {
            settlement_id: SettlementId(crate::constants::RENEX_SETTLEMENT_ID),
            tokens,
            price,
            volume,
            minimum_volume: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenCode;

    fn details() -> OrderDetails {
        OrderDetails::dummy(TokenPair::new(TokenCode(1), TokenCode(2)), 5, 10)
    }

    #[test]
    fn order_id_is_deterministic() {
        let d = details();
        assert_eq!(d.order_id(b"prefix"), d.order_id(b"prefix"));
    }

    #[test]
    fn order_id_commits_to_every_field() {
        let d = details();
        let base = d.order_id(b"prefix");
        assert_ne!(base, d.order_id(b"other"));
        assert_ne!(base, OrderDetails { price: 6, ..d }.order_id(b"prefix"));
        assert_ne!(base, OrderDetails { volume: 11, ..d }.order_id(b"prefix"));
        assert_ne!(
            base,
            OrderDetails {
                minimum_volume: 1,
                ..d
            }
            .order_id(b"prefix")
        );
        assert_ne!(
            base,
            OrderDetails {
                settlement_id: SettlementId(2),
                ..d
            }
            .order_id(b"prefix")
        );
        assert_ne!(
            base,
            OrderDetails {
                tokens: TokenPair::new(TokenCode(2), TokenCode(1)),
                ..d
            }
            .order_id(b"prefix")
        );
    }

    #[test]
    fn prefix_length_is_committed() {
        // Shifting a byte between prefix and the first field must not collide.
        let d = details();
        assert_ne!(d.order_id(b"ab"), d.order_id(b"a"));
    }

    #[test]
    fn state_codes_and_display() {
        assert_eq!(OrderState::Undefined.code(), 0);
        assert_eq!(OrderState::Open.code(), 1);
        assert_eq!(OrderState::Confirmed.code(), 2);
        assert_eq!(OrderState::Canceled.code(), 3);
        assert_eq!(format!("{}", OrderParity::Buy), "BUY");
        assert_eq!(OrderParity::Sell.opposite(), OrderParity::Buy);
    }
}
