//! Darknode fee attribution.
//!
//! Settlement fees are credited to the vault's own account in the balance
//! ledger. The vault records which darknode earned each fee, so that the
//! darknode's owner can later move exactly that share out, and so that a
//! slash can take back fees for a fraudulent match.

use std::collections::HashMap;

use darkpool_types::{Address, Amount, CallContext, DarkpoolError, Result, checked_add};

/// Per-(darknode, token) fee balances held in the vault's ledger account.
#[derive(Debug, Clone)]
pub struct RewardVault {
    address: Address,
    /// The only caller allowed to change attributions.
    settlement: Address,
    rewards: HashMap<(Address, Address), Amount>,
}

impl RewardVault {
    #[must_use]
    pub fn new(address: Address, settlement: Address) -> Self {
        Self {
            address,
            settlement,
            rewards: HashMap::new(),
        }
    }

    /// The vault's ledger account.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn settlement(&self) -> Address {
        self.settlement
    }

    /// Attribute `value` of `token` to `darknode`.
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        darknode: Address,
        token: Address,
        value: Amount,
    ) -> Result<()> {
        self.require_settlement(ctx, "deposit")?;
        let next = checked_add(self.balance(darknode, token), value)?;
        self.rewards.insert((darknode, token), next);
        tracing::debug!(darknode = %darknode, token = %token, value = %value, "Reward attributed");
        Ok(())
    }

    #[must_use]
    pub fn balance(&self, darknode: Address, token: Address) -> Amount {
        self.rewards
            .get(&(darknode, token))
            .copied()
            .unwrap_or_default()
    }

    /// Zero `darknode`'s `token` rewards and return what was there.
    pub fn take(&mut self, ctx: &CallContext, darknode: Address, token: Address) -> Result<Amount> {
        self.require_settlement(ctx, "take")?;
        Ok(self.rewards.remove(&(darknode, token)).unwrap_or_default())
    }

    /// Remove up to `value` from `darknode`'s `token` rewards, returning the
    /// amount actually removed.
    pub fn reclaim(
        &mut self,
        ctx: &CallContext,
        darknode: Address,
        token: Address,
        value: Amount,
    ) -> Result<Amount> {
        self.require_settlement(ctx, "reclaim")?;
        let held = self.balance(darknode, token);
        let reclaimed = held.min(value);
        if reclaimed == held {
            self.rewards.remove(&(darknode, token));
        } else {
            self.rewards.insert((darknode, token), held - reclaimed);
        }
        Ok(reclaimed)
    }

    /// Sum of every darknode's `token` rewards.
    #[must_use]
    pub fn total(&self, token: Address) -> Amount {
        self.rewards
            .iter()
            .filter(|((_, t), _)| *t == token)
            .fold(Amount::zero(), |acc, (_, v)| acc.saturating_add(*v))
    }

    fn require_settlement(&self, ctx: &CallContext, operation: &'static str) -> Result<()> {
        if ctx.sender != self.settlement {
            tracing::warn!(caller = %ctx.sender, operation, "Reward vault call rejected");
            return Err(DarkpoolError::Unauthorized {
                caller: ctx.sender,
                operation,
            });
        }
        Ok(())
    }
}
