//! # darkpool-ledger
//!
//! Custody for the darkpool.
//!
//! - [`TokenRegistry`]: token code to address/decimals metadata
//! - [`BalanceLedger`]: per-(trader, token) balances with deposit,
//!   two-path withdrawal, and the settlement-only fee transfer
//! - [`SignedBrokerVerifier`]: broker co-signatures for immediate withdrawals
//! - [`WithdrawSignals`]: the broker-independent, delayed withdrawal path
//! - [`SupplyConservation`]: `Σ balances == deposits - withdrawals` per token
//!
//! The settlement engine reaches the ledger and token metadata through the
//! [`SettlementLedger`] and [`TokenMetadata`] traits.

pub mod balances;
pub mod broker;
pub mod supply_conservation;
pub mod tokens;
pub mod withdraw_signal;

pub use balances::{BalanceLedger, FeeTransfer, SettlementLedger};
pub use broker::{BrokerVerifier, SignedBrokerVerifier};
pub use supply_conservation::SupplyConservation;
pub use tokens::{TokenDetails, TokenMetadata, TokenRegistry};
pub use withdraw_signal::WithdrawSignals;
