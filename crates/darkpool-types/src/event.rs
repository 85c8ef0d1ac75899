//! Append-only event records.
//!
//! Every state transition in the core emits an [`Event`] into the
//! component's [`EventLog`]. Records are immutable once appended; off-chain
//! observers reconstruct state by reading them in order.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BlockNumber, OrderId, TokenCode};

/// A log record emitted by a core component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // --- Darknode registry ---
    DarknodeRegistered { node: Address, bond: Amount },
    DarknodeDeregistered { node: Address },
    DarknodeOwnerRefunded { owner: Address, amount: Amount },
    DarknodeSlashed {
        prover: Address,
        penalty: Amount,
        reward: Amount,
    },
    NewEpoch { epochhash: [u8; 32], block_number: BlockNumber },
    MinimumBondUpdated { previous: Amount, next: Amount },
    MinimumPodSizeUpdated { previous: u64, next: u64 },
    MinimumEpochIntervalUpdated { previous: u64, next: u64 },
    SlasherUpdated {
        previous: Option<Address>,
        next: Option<Address>,
    },

    // --- Orderbook ---
    OrderOpened {
        id: OrderId,
        trader: Address,
        buy: bool,
    },
    OrderConfirmed {
        id: OrderId,
        matched: OrderId,
        darknode: Address,
    },
    OrderCanceled { id: OrderId },
    OrderOpeningFeeUpdated { previous: Amount, next: Amount },
    DarknodeRegistryUpdated { previous: Address, next: Address },

    // --- Balances ---
    BalanceIncreased {
        trader: Address,
        token: Address,
        value: Amount,
    },
    BalanceDecreased {
        trader: Address,
        token: Address,
        value: Amount,
    },
    WithdrawSignaled {
        trader: Address,
        token: Address,
        block_number: BlockNumber,
    },
    SettlementContractUpdated { previous: Address, next: Address },
    BrokerVerifierUpdated { previous: Address, next: Address },

    // --- Tokens / brokers ---
    TokenRegistered {
        code: TokenCode,
        address: Address,
        decimals: u8,
    },
    TokenDeregistered { code: TokenCode },
    BrokerRegistered { broker: Address },
    BrokerDeregistered { broker: Address },

    // --- Settlement ---
    OrderSubmitted { id: OrderId },
    OrderSettled { buy: OrderId, sell: OrderId },
    OrderSlashed { guilty: OrderId, innocent: OrderId },
    TokenRegistryUpdated { previous: Address, next: Address },
    BalancesUpdated { previous: Address, next: Address },
    RewardVaultUpdated { previous: Address, next: Address },
    OrderbookUpdated { previous: Address, next: Address },
    SubmissionGasPriceLimitUpdated { previous: u64, next: u64 },
    RewardWithdrawn {
        darknode: Address,
        owner: Address,
        token: Address,
        value: Amount,
    },

    // --- Administration ---
    OwnershipTransferred {
        previous: Option<Address>,
        next: Option<Address>,
    },
    Paused,
    Unpaused,
}

impl Event {
    /// The canonical log record name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DarknodeRegistered { .. } => "LogDarknodeRegistered",
            Self::DarknodeDeregistered { .. } => "LogDarknodeDeregistered",
            Self::DarknodeOwnerRefunded { .. } => "LogDarknodeOwnerRefunded",
            Self::DarknodeSlashed { .. } => "LogDarknodeSlashed",
            Self::NewEpoch { .. } => "LogNewEpoch",
            Self::MinimumBondUpdated { .. } => "LogMinimumBondUpdated",
            Self::MinimumPodSizeUpdated { .. } => "LogMinimumPodSizeUpdated",
            Self::MinimumEpochIntervalUpdated { .. } => "LogMinimumEpochIntervalUpdated",
            Self::SlasherUpdated { .. } => "LogSlasherUpdated",
            Self::OrderOpened { .. } => "LogOrderOpened",
            Self::OrderConfirmed { .. } => "LogOrderConfirmed",
            Self::OrderCanceled { .. } => "LogOrderCanceled",
            Self::OrderOpeningFeeUpdated { .. } => "LogOrderOpeningFeeUpdated",
            Self::DarknodeRegistryUpdated { .. } => "LogDarknodeRegistryUpdated",
            Self::BalanceIncreased { .. } => "LogBalanceIncreased",
            Self::BalanceDecreased { .. } => "LogBalanceDecreased",
            Self::WithdrawSignaled { .. } => "LogWithdrawSignaled",
            Self::SettlementContractUpdated { .. } => "LogRenExSettlementContractUpdated",
            Self::BrokerVerifierUpdated { .. } => "LogBrokerVerifierContractUpdated",
            Self::TokenRegistered { .. } => "LogTokenRegistered",
            Self::TokenDeregistered { .. } => "LogTokenDeregistered",
            Self::BrokerRegistered { .. } => "LogBrokerRegistered",
            Self::BrokerDeregistered { .. } => "LogBrokerDeregistered",
            Self::OrderSubmitted { .. } => "LogOrderSubmitted",
            Self::OrderSettled { .. } => "LogOrderSettled",
            Self::OrderSlashed { .. } => "LogOrderSlashed",
            Self::TokenRegistryUpdated { .. } => "LogRenExTokensUpdated",
            Self::BalancesUpdated { .. } => "LogRenExBalancesUpdated",
            Self::RewardVaultUpdated { .. } => "LogRewardVaultUpdated",
            Self::OrderbookUpdated { .. } => "LogOrderbookUpdated",
            Self::SubmissionGasPriceLimitUpdated { .. } => "LogSubmissionGasPriceLimitUpdated",
            Self::RewardWithdrawn { .. } => "LogRewardWithdrawn",
            Self::OwnershipTransferred { .. } => "LogOwnershipTransferred",
            Self::Paused => "LogPause",
            Self::Unpaused => "LogUnpause",
        }
    }
}

/// Append-only event log owned by a component.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<Event>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn emit(&mut self, event: Event) {
        tracing::trace!(event = event.name(), "Event emitted");
        self.records.push(event);
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[Event] {
        &self.records
    }

    /// Records appended since `cursor` (a previous `len()`).
    #[must_use]
    pub fn since(&self, cursor: usize) -> &[Event] {
        self.records.get(cursor..).unwrap_or(&[])
    }

    /// The most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&Event> {
        self.records.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
