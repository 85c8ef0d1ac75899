//! # darkpool-settlement
//!
//! Turns a confirmed buy/sell pair into balance movements.
//!
//! ## Flow
//!
//! ```text
//!   Orderbook: Open ──confirm──▶ Confirmed
//!                                   │
//!   trader ──submit_order(details)──┤   details hash back to the order id
//!                                   ▼
//!   SettlementEngine::settle(buy, sell)
//!     1. validate: parity, pair, price, minimum volume
//!     2. compute:  mid price, leg volumes, darknode fees
//!     3. mark both orders Settled
//!     4. BalanceLedger::transfer_balance_with_fee × 2
//!        buyer  ─priority token──▶ seller  (fee → reward vault)
//!        seller ─secondary token─▶ buyer   (fee → reward vault)
//! ```
//!
//! A pair that was confirmed fraudulently can be slashed by the slasher:
//! any settled legs are reversed, the confirming darknode's bond is slashed
//! in the registry, and both orders become permanently unsettleable.

pub mod reward_vault;
pub mod settlement;

pub use reward_vault::RewardVault;
pub use settlement::{Collaborators, MatchDetails, SettlementEngine, SettlementStatus};
