//! Configuration for the darkpool components.
//!
//! Every component is constructed from one of these structs. Defaults hold
//! the protocol constants from [`crate::constants`]; deployments override
//! them from a JSON file via [`DarkpoolConfig::from_path`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, DarkpoolError, Result, constants};

/// Darknode registry policy. Changes made after construction are staged and
/// take effect at the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Token in which darknode bonds are posted.
    pub bond_token: Address,
    /// Smallest accepted bond.
    pub minimum_bond: Amount,
    /// Smallest pod a darknode may confirm orders from.
    pub minimum_pod_size: u64,
    /// Blocks that must pass between epochs.
    pub minimum_epoch_interval: u64,
    /// Account allowed to slash darknodes.
    pub slasher: Option<Address>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bond_token: Address::derived("ren"),
            minimum_bond: Amount::from(constants::DEFAULT_MINIMUM_BOND),
            minimum_pod_size: constants::DEFAULT_MINIMUM_POD_SIZE,
            minimum_epoch_interval: constants::DEFAULT_MINIMUM_EPOCH_INTERVAL,
            slasher: None,
        }
    }
}

/// Orderbook fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderbookConfig {
    /// Token the opening fee is charged in.
    pub fee_token: Address,
    /// Fee charged to the broker for every opened order.
    pub order_opening_fee: Amount,
}

impl Default for OrderbookConfig {
    fn default() -> Self {
        Self {
            fee_token: Address::derived("ren"),
            order_opening_fee: Amount::from(constants::DEFAULT_ORDER_OPENING_FEE),
        }
    }
}

/// Balance ledger policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Blocks between a withdrawal signal and a broker-less withdrawal.
    pub signal_delay: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            signal_delay: constants::DEFAULT_SIGNAL_DELAY,
        }
    }
}

/// Settlement engine policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Settlement id orders must carry to be settled here.
    pub settlement_id: u64,
    /// Maximum gas price accepted by `submit_order`.
    pub submission_gas_price_limit: u64,
    /// Account allowed to slash orders.
    pub slasher: Option<Address>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            settlement_id: constants::RENEX_SETTLEMENT_ID,
            submission_gas_price_limit: constants::DEFAULT_SUBMISSION_GAS_PRICE_LIMIT,
            slasher: None,
        }
    }
}

/// Complete configuration of a darkpool deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkpoolConfig {
    pub registry: RegistryConfig,
    pub orderbook: OrderbookConfig,
    pub ledger: LedgerConfig,
    pub settlement: SettlementConfig,
}

impl DarkpoolConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DarkpoolError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.minimum_pod_size == 0 {
            return Err(DarkpoolError::Configuration(
                "registry.minimum_pod_size must be > 0".into(),
            ));
        }
        if self.registry.minimum_epoch_interval == 0 {
            return Err(DarkpoolError::Configuration(
                "registry.minimum_epoch_interval must be > 0".into(),
            ));
        }
        if self.settlement.settlement_id == 0 {
            return Err(DarkpoolError::Configuration(
                "settlement.settlement_id must be > 0".into(),
            ));
        }
        Ok(())
    }
}
