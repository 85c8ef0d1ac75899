//! # darkpool-registry
//!
//! **Darknode Registry**: the staked cohort of darknodes allowed to confirm
//! order matches.
//!
//! ## Lifecycle
//!
//! ```text
//! Unregistered ─register─▶ PendingRegistration ─epoch─▶ Registered
//!      ▲                                                   │
//!      │                                               deregister
//!   refund                                                 ▼
//!      │                                          PendingDeregistration
//!  Refundable ◀─epoch─ Deregistered ◀────epoch─────────────┘
//!
//! Registered ─slash─▶ Unregistered (bond minus penalty returned)
//! ```
//!
//! Registration and deregistration only take effect when an epoch is cut,
//! and policy changes staged by the owner are committed at the same point.

pub mod darknode;
pub mod pod;
pub mod registry;

pub use darknode::{Darknode, DarknodeStatus, Epoch};
pub use pod::assign_pods;
pub use registry::DarknodeRegistry;
