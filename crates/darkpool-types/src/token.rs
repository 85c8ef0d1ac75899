//! ERC20 transfer capability.
//!
//! Token custody lives outside the core. Components move tokens by calling
//! an [`Erc20`] implementation, which is the only place control leaves the
//! core during a call. Callers mutate their own state first and undo it if
//! the transfer fails.

use std::collections::HashMap;

use crate::{Address, Amount, DarkpoolError, Result};

/// ERC20-compatible surface over many tokens, keyed by token address.
pub trait Erc20 {
    fn balance_of(&self, token: Address, owner: Address) -> Amount;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount;

    /// `owner` allows `spender` to move up to `value`.
    fn approve(&mut self, token: Address, owner: Address, spender: Address, value: Amount);

    /// Move `value` from `from` to `to` on `from`'s own authority.
    fn transfer(&mut self, token: Address, from: Address, to: Address, value: Amount)
    -> Result<()>;

    /// Move `value` from `from` to `to` on `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<()>;
}

/// In-memory multi-token ERC20 implementation.
///
/// The native-coin sentinel [`Address::ETHEREUM`] behaves like any other
/// token except that it has no allowances: value attached to a call is
/// moved with [`Erc20::transfer`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryErc20 {
    balances: HashMap<(Address, Address), Amount>,
    allowances: HashMap<(Address, Address, Address), Amount>,
    /// Tokens whose transfers are rejected (simulates a failing token).
    frozen_tokens: Vec<Address>,
}

impl InMemoryErc20 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `value` of `token` out of thin air for `owner`.
    pub fn mint(&mut self, token: Address, owner: Address, value: Amount) {
        let entry = self.balances.entry((token, owner)).or_default();
        *entry = entry.saturating_add(value);
    }

    /// Make every subsequent transfer of `token` fail.
    pub fn freeze_token(&mut self, token: Address) {
        self.frozen_tokens.push(token);
    }

    /// Total supply of `token` across all holders.
    #[must_use]
    pub fn total_supply(&self, token: Address) -> Amount {
        self.balances
            .iter()
            .filter(|((t, _), _)| *t == token)
            .fold(Amount::zero(), |acc, (_, v)| acc.saturating_add(*v))
    }

    fn move_balance(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<()> {
        if self.frozen_tokens.contains(&token) {
            return Err(DarkpoolError::TransferFailed {
                reason: format!("token {token} rejected the transfer"),
            });
        }
        let available = self.balance_of(token, from);
        if available < value {
            return Err(DarkpoolError::TransferFailed {
                reason: format!("{from} holds {available} of {token}, needs {value}"),
            });
        }
        self.balances.insert((token, from), available - value);
        let entry = self.balances.entry((token, to)).or_default();
        *entry = entry
            .checked_add(value)
            .ok_or(DarkpoolError::ArithmeticOverflow)?;
        Ok(())
    }
}

impl Erc20 for InMemoryErc20 {
    fn balance_of(&self, token: Address, owner: Address) -> Amount {
        self.balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn approve(&mut self, token: Address, owner: Address, spender: Address, value: Amount) {
        self.allowances.insert((token, owner, spender), value);
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<()> {
        self.move_balance(token, from, to, value)
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<()> {
        let allowed = self.allowance(token, from, spender);
        if allowed < value {
            return Err(DarkpoolError::TransferFailed {
                reason: format!("{spender} allowed {allowed} by {from}, needs {value}"),
            });
        }
        self.move_balance(token, from, to, value)?;
        self.allowances.insert((token, from, spender), allowed - value);
        Ok(())
    }
}
