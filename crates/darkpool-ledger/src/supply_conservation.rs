//! Supply conservation invariant checker.
//!
//! Invariant enforced over the balance ledger:
//! ```text
//! ∀ token: Σ balances(trader, token) == Σ deposits(token) - Σ withdrawals(token)
//! ```
//!
//! Settlement transfers only move balances between traders, so they never
//! change either side. A violation means value was created or destroyed.

use std::collections::{BTreeSet, HashMap};

use darkpool_types::{Address, Amount, DarkpoolError, Result};

/// Per-token deposit and withdrawal totals since genesis.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    deposits: HashMap<Address, Amount>,
    withdrawals: HashMap<Address, Amount>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, token: Address, value: Amount) {
        let entry = self.deposits.entry(token).or_default();
        *entry = entry.saturating_add(value);
    }

    pub fn record_withdrawal(&mut self, token: Address, value: Amount) {
        let entry = self.withdrawals.entry(token).or_default();
        *entry = entry.saturating_add(value);
    }

    /// `deposits - withdrawals`, or `None` if more was withdrawn than
    /// deposited.
    #[must_use]
    pub fn expected_supply(&self, token: Address) -> Option<Amount> {
        self.total_deposits(token)
            .checked_sub(self.total_withdrawals(token))
    }

    /// Check the ledger's `actual_supply` of `token` against the totals.
    ///
    /// # Errors
    /// Returns [`DarkpoolError::SupplyInvariantViolation`] if they differ.
    pub fn verify(&self, token: Address, actual_supply: Amount) -> Result<()> {
        if self.expected_supply(token) != Some(actual_supply) {
            tracing::error!(
                token = %token,
                actual = %actual_supply,
                deposits = %self.total_deposits(token),
                withdrawals = %self.total_withdrawals(token),
                "Supply invariant violated"
            );
            return Err(DarkpoolError::SupplyInvariantViolation {
                reason: format!(
                    "token {token}: actual supply {actual_supply} != deposits {} - withdrawals {}",
                    self.total_deposits(token),
                    self.total_withdrawals(token),
                ),
            });
        }
        Ok(())
    }

    /// Every token with recorded activity, in address order.
    #[must_use]
    pub fn tracked_tokens(&self) -> Vec<Address> {
        let tokens: BTreeSet<Address> = self
            .deposits
            .keys()
            .chain(self.withdrawals.keys())
            .copied()
            .collect();
        tokens.into_iter().collect()
    }

    #[must_use]
    pub fn total_deposits(&self, token: Address) -> Amount {
        self.deposits.get(&token).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_withdrawals(&self, token: Address) -> Amount {
        self.withdrawals.get(&token).copied().unwrap_or_default()
    }
}
