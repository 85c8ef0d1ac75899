//! Darknode and epoch records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use darkpool_types::{Address, Amount, BlockNumber};

/// An epoch checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Epoch {
    /// Pseudo-random seed for this epoch (pod assignment).
    pub epochhash: [u8; 32],
    /// Block at which the epoch was cut.
    pub blocknumber: BlockNumber,
}

impl Epoch {
    /// The first epoch, cut when the registry is created.
    #[must_use]
    pub fn genesis(blocknumber: BlockNumber) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"darkpool:epoch:genesis:");
        hasher.update(blocknumber.to_be_bytes());
        let mut epochhash = [0u8; 32];
        epochhash.copy_from_slice(&hasher.finalize());
        Self {
            epochhash,
            blocknumber,
        }
    }

    /// The epoch following `self`, cut at `blocknumber`.
    #[must_use]
    pub fn next(&self, blocknumber: BlockNumber) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"darkpool:epoch:v1:");
        hasher.update(self.epochhash);
        hasher.update(blocknumber.to_be_bytes());
        let mut epochhash = [0u8; 32];
        epochhash.copy_from_slice(&hasher.finalize());
        Self {
            epochhash,
            blocknumber,
        }
    }
}

/// A registered (or registering / deregistering) darknode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darknode {
    pub id: Address,
    pub owner: Address,
    pub bond: Amount,
    pub public_key: Vec<u8>,
    /// First epoch block at which the node counts as registered.
    pub registered_at: BlockNumber,
    /// First epoch block at which the node no longer counts; `0` if never
    /// deregistered.
    pub deregistered_at: BlockNumber,
}

impl Darknode {
    /// Whether this node belongs to the cohort of the epoch cut at `epoch`.
    #[must_use]
    pub fn is_registered_in(&self, epoch: &Epoch) -> bool {
        self.registered_at != 0
            && self.registered_at <= epoch.blocknumber
            && (self.deregistered_at == 0 || self.deregistered_at > epoch.blocknumber)
    }
}

/// Derived lifecycle state of a darknode relative to the current and
/// previous epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DarknodeStatus {
    /// No record: never registered, refunded, or slashed out.
    Unregistered,
    /// Registered, waiting for the next epoch.
    PendingRegistration,
    /// In the current cohort.
    Registered,
    /// In the current cohort, leaving at the next epoch.
    PendingDeregistration,
    /// Out of the cohort; bond still locked for one more epoch.
    Deregistered,
    /// Bond can be refunded.
    Refundable,
}

impl std::fmt::Display for DarknodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => write!(f, "UNREGISTERED"),
            Self::PendingRegistration => write!(f, "PENDING_REGISTRATION"),
            Self::Registered => write!(f, "REGISTERED"),
            Self::PendingDeregistration => write!(f, "PENDING_DEREGISTRATION"),
            Self::Deregistered => write!(f, "DEREGISTERED"),
            Self::Refundable => write!(f, "REFUNDABLE"),
        }
    }
}
