//! # darkpool-types
//!
//! Shared types, capabilities, errors, and configuration for the
//! **darkpool** settlement core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`OrderId`], [`TokenCode`], [`TokenPair`], [`SettlementId`]
//! - **Amounts**: [`Amount`] (`U256`) with checked helpers and the darknode fee split
//! - **Order model**: [`Order`], [`OrderDetails`], [`OrderParity`], [`OrderState`]
//! - **Call model**: [`CallContext`], [`Event`], [`EventLog`]
//! - **Capabilities**: [`SignatureVerifier`], [`Erc20`]
//! - **Administration**: [`Ownable`], [`Pausable`]
//! - **Configuration**: [`DarkpoolConfig`] and per-component configs
//! - **Errors**: [`DarkpoolError`] with `DP_ERR_` prefix codes
//! - **Constants**: protocol limits and defaults

pub mod admin;
pub mod amount;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod event;
pub mod fixed_point;
pub mod ids;
pub mod order;
pub mod signature;
pub mod telemetry;
pub mod token;

// Re-export all primary types at crate root for ergonomic imports:
//   use darkpool_types::{Address, Amount, OrderId, CallContext, ...};

pub use admin::*;
pub use amount::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use order::*;
pub use signature::*;
pub use token::*;

// Constants and fixed-point helpers are accessed via their module paths
// (not re-exported to avoid name collisions).

/// Random addresses for tests.
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    pub fn random() -> Self {
        Self(rand::random())
    }
}
