//! Delayed, broker-independent withdrawal signals.
//!
//! A trader who cannot get a broker co-signature signals intent to
//! withdraw a token. Once `delay` blocks have passed since the signal, the
//! trader may withdraw that token without a broker. Each signal authorizes
//! one withdrawal.

use std::collections::HashMap;

use darkpool_types::{Address, BlockNumber, DarkpoolError, Result};

/// Per-(trader, token) withdrawal signals.
#[derive(Debug, Clone)]
pub struct WithdrawSignals {
    delay: u64,
    signals: HashMap<(Address, Address), BlockNumber>,
}

impl WithdrawSignals {
    #[must_use]
    pub fn new(delay: u64) -> Self {
        Self {
            delay,
            signals: HashMap::new(),
        }
    }

    #[must_use]
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Record a signal at `block`, replacing any earlier one.
    pub fn signal(&mut self, trader: Address, token: Address, block: BlockNumber) {
        self.signals.insert((trader, token), block);
    }

    #[must_use]
    pub fn signaled_at(&self, trader: Address, token: Address) -> Option<BlockNumber> {
        self.signals.get(&(trader, token)).copied()
    }

    /// First block at which the pending signal can be used.
    #[must_use]
    pub fn matures_at(&self, trader: Address, token: Address) -> Option<BlockNumber> {
        self.signaled_at(trader, token)
            .map(|at| at.saturating_add(self.delay))
    }

    /// Guard a signal-path withdrawal at `block`.
    pub fn check(&self, trader: Address, token: Address, block: BlockNumber) -> Result<()> {
        match self.matures_at(trader, token) {
            None => Err(DarkpoolError::WithdrawalNotAuthorized { trader }),
            Some(matures_at) if block < matures_at => {
                Err(DarkpoolError::SignalNotMatured { matures_at })
            }
            Some(_) => Ok(()),
        }
    }

    /// Consume the signal.
    pub fn clear(&mut self, trader: Address, token: Address) {
        self.signals.remove(&(trader, token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trader() -> Address {
        Address::derived("trader")
    }

    #[test]
    fn no_signal_not_authorized() {
        let signals = WithdrawSignals::new(10);
        assert_eq!(
            signals.check(trader(), Address::ETHEREUM, 1_000).unwrap_err(),
            DarkpoolError::WithdrawalNotAuthorized { trader: trader() }
        );
    }

    #[test]
    fn signal_matures_after_delay() {
        let mut signals = WithdrawSignals::new(10);
        signals.signal(trader(), Address::ETHEREUM, 100);
        assert_eq!(signals.matures_at(trader(), Address::ETHEREUM), Some(110));
        assert_eq!(
            signals.check(trader(), Address::ETHEREUM, 109).unwrap_err(),
            DarkpoolError::SignalNotMatured { matures_at: 110 }
        );
        assert!(signals.check(trader(), Address::ETHEREUM, 110).is_ok());
    }

    #[test]
    fn signals_are_per_token() {
        let mut signals = WithdrawSignals::new(10);
        signals.signal(trader(), Address::ETHEREUM, 100);
        assert!(signals.check(trader(), Address::derived("dgx"), 200).is_err());
    }

    #[test]
    fn resignal_restarts_delay_and_clear_consumes() {
        let mut signals = WithdrawSignals::new(10);
        signals.signal(trader(), Address::ETHEREUM, 100);
        signals.signal(trader(), Address::ETHEREUM, 150);
        assert!(signals.check(trader(), Address::ETHEREUM, 155).is_err());
        assert!(signals.check(trader(), Address::ETHEREUM, 160).is_ok());

        signals.clear(trader(), Address::ETHEREUM);
        assert_eq!(signals.signaled_at(trader(), Address::ETHEREUM), None);
    }

    #[test]
    fn signal_at_genesis_block_counts() {
        let mut signals = WithdrawSignals::new(0);
        signals.signal(trader(), Address::ETHEREUM, 0);
        assert!(signals.check(trader(), Address::ETHEREUM, 0).is_ok());
    }
}
