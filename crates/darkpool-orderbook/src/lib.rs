//! # darkpool-orderbook
//!
//! **Orderbook**: the registry of order hashes and their lifecycle.
//!
//! Orders arrive as bare IDs signed by their trader. Details stay off the
//! book until a match is settled; the book only tracks who opened what, in
//! which direction, and whether a darknode has confirmed it.
//!
//! ```text
//! Undefined ─open─▶ Open ─confirm─▶ Confirmed (terminal)
//!                     │
//!                   cancel
//!                     ▼
//!                 Canceled (terminal)
//! ```

pub mod orderbook;

pub use orderbook::{OrderPage, Orderbook};
