//! The balance ledger.
//!
//! Custodies trader funds per `(trader, token)`. Balances change through
//! exactly three gated entry points:
//!
//! - [`BalanceLedger::deposit`]: tokens move in, balance goes up
//! - [`BalanceLedger::withdraw`]: balance goes down, tokens move out
//! - [`SettlementLedger::transfer_balance_with_fee`]: balance moves between
//!   traders, callable only by the settlement engine
//!
//! ## Withdrawal authorization
//!
//! 1. **Broker path**: a broker co-signs the withdrawal; honored at once.
//! 2. **Signal path**: the trader called
//!    [`BalanceLedger::signal_backup_withdraw`] at least `signal_delay`
//!    blocks ago; honored without a broker, consuming the signal.
//!
//! ## Ordering
//!
//! Balance cells are updated before tokens move. A rejected transfer
//! restores the cell, so a failed call leaves the ledger unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use darkpool_types::{
    Address, Amount, CallContext, DarkpoolError, Erc20, Event, EventLog, LedgerConfig, Ownable,
    Result, checked_add, checked_sub,
};

use crate::broker::BrokerVerifier;
use crate::supply_conservation::SupplyConservation;
use crate::withdraw_signal::WithdrawSignals;

/// One leg of a settlement: debit `from` by `value + fee`, credit `to`
/// with `value` and `fee_payee` with `fee`, all in `token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTransfer {
    pub from: Address,
    pub to: Address,
    pub token: Address,
    pub value: Amount,
    pub fee: Amount,
    pub fee_payee: Address,
}

impl FeeTransfer {
    /// The same leg with its direction reversed: `to` and `fee_payee` are
    /// debited, `from` is credited.
    #[must_use]
    pub fn reversed(&self) -> [Self; 2] {
        [
            Self {
                from: self.to,
                to: self.from,
                token: self.token,
                value: self.value,
                fee: Amount::zero(),
                fee_payee: self.fee_payee,
            },
            Self {
                from: self.fee_payee,
                to: self.from,
                token: self.token,
                value: self.fee,
                fee: Amount::zero(),
                fee_payee: self.fee_payee,
            },
        ]
    }
}

/// Balance operations the settlement engine relies on.
pub trait SettlementLedger {
    /// Address the ledger is deployed at.
    fn address(&self) -> Address;

    fn balance(&self, trader: Address, token: Address) -> Amount;

    /// Apply `transfer` atomically. Only the registered settlement engine
    /// may call.
    fn transfer_balance_with_fee(&mut self, ctx: &CallContext, transfer: &FeeTransfer)
    -> Result<()>;
}

/// Per-(trader, token) custody.
#[derive(Debug, Clone)]
pub struct BalanceLedger {
    address: Address,
    ownable: Ownable,
    settlement_contract: Address,
    broker_verifier: Address,
    balances: HashMap<(Address, Address), Amount>,
    /// Tokens each trader has held, in first-touch order.
    trader_tokens: HashMap<Address, Vec<Address>>,
    signals: WithdrawSignals,
    supply: SupplyConservation,
    events: EventLog,
}

impl BalanceLedger {
    #[must_use]
    pub fn new(
        address: Address,
        owner: Address,
        settlement_contract: Address,
        broker_verifier: Address,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            address,
            ownable: Ownable::new(owner),
            settlement_contract,
            broker_verifier,
            balances: HashMap::new(),
            trader_tokens: HashMap::new(),
            signals: WithdrawSignals::new(config.signal_delay),
            supply: SupplyConservation::new(),
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn settlement_contract(&self) -> Address {
        self.settlement_contract
    }

    #[must_use]
    pub fn broker_verifier(&self) -> Address {
        self.broker_verifier
    }

    #[must_use]
    pub fn signals(&self) -> &WithdrawSignals {
        &self.signals
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    // =================================================================
    // Deposits and withdrawals
    // =================================================================

    /// Credit the caller with `value` of `token`.
    ///
    /// For [`Address::ETHEREUM`] the value must be attached to the call;
    /// otherwise the caller must have approved the ledger as spender.
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        erc20: &mut dyn Erc20,
        token: Address,
        value: Amount,
    ) -> Result<()> {
        let trader = ctx.sender;
        if token == Address::ETHEREUM && ctx.value != value {
            return Err(DarkpoolError::ValueMismatch {
                attached: ctx.value,
                expected: value,
            });
        }

        let previous = self.balance(trader, token);
        self.set_balance(trader, token, checked_add(previous, value)?);

        let moved = if token == Address::ETHEREUM {
            erc20.transfer(token, trader, self.address, value)
        } else {
            erc20.transfer_from(token, self.address, trader, self.address, value)
        };
        if let Err(e) = moved {
            self.set_balance(trader, token, previous);
            return Err(e);
        }

        self.supply.record_deposit(token, value);
        tracing::info!(trader = %trader, token = %token, value = %value, "Deposit");
        self.events.emit(Event::BalanceIncreased {
            trader,
            token,
            value,
        });
        Ok(())
    }

    /// Record the caller's intent to withdraw `token` without a broker.
    pub fn signal_backup_withdraw(&mut self, ctx: &CallContext, token: Address) {
        self.signals.signal(ctx.sender, token, ctx.block_number);
        tracing::info!(
            trader = %ctx.sender,
            token = %token,
            matures_at = ctx.block_number.saturating_add(self.signals.delay()),
            "Withdrawal signaled"
        );
        self.events.emit(Event::WithdrawSignaled {
            trader: ctx.sender,
            token,
            block_number: ctx.block_number,
        });
    }

    /// Withdraw `value` of `token` to the caller.
    ///
    /// A non-empty `signature` is first tried as a broker authorization;
    /// otherwise (or if it does not verify) a matured withdrawal signal is
    /// required.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        erc20: &mut dyn Erc20,
        brokers: &mut dyn BrokerVerifier,
        token: Address,
        value: Amount,
        signature: &[u8],
    ) -> Result<()> {
        let trader = ctx.sender;
        let previous = self.balance(trader, token);
        let remaining = checked_sub(previous, value)?;

        let as_ledger = ctx.forward(self.address);
        let broker_signed = !signature.is_empty()
            && brokers.address() == self.broker_verifier
            && brokers.verify_withdraw_signature(&as_ledger, trader, signature)?;
        if !broker_signed {
            self.signals
                .check(trader, token, ctx.block_number)
                .inspect_err(|e| {
                    tracing::warn!(trader = %trader, token = %token, error = %e, "Withdrawal rejected");
                })?;
        }

        self.set_balance(trader, token, remaining);
        if let Err(e) = erc20.transfer(token, self.address, trader, value) {
            self.set_balance(trader, token, previous);
            return Err(e);
        }

        if broker_signed {
            brokers.consume_withdraw_signature(&as_ledger, trader)?;
        } else {
            self.signals.clear(trader, token);
        }
        self.supply.record_withdrawal(token, value);

        let path = if broker_signed { "broker" } else { "signal" };
        tracing::info!(trader = %trader, token = %token, value = %value, path, "Withdrawal");
        self.events.emit(Event::BalanceDecreased {
            trader,
            token,
            value,
        });
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Every token `trader` has held with its current balance.
    #[must_use]
    pub fn trader_balances(&self, trader: Address) -> (Vec<Address>, Vec<Amount>) {
        let tokens = self.trader_tokens.get(&trader).cloned().unwrap_or_default();
        let balances = tokens.iter().map(|t| self.balance(trader, *t)).collect();
        (tokens, balances)
    }

    /// Sum of all balances of `token`.
    #[must_use]
    pub fn total_balance(&self, token: Address) -> Amount {
        self.balances
            .iter()
            .filter(|((_, t), _)| *t == token)
            .fold(Amount::zero(), |acc, (_, v)| acc.saturating_add(*v))
    }

    /// Check `Σ balances == deposits - withdrawals` for `token`.
    pub fn verify_supply(&self, token: Address) -> Result<()> {
        self.supply.verify(token, self.total_balance(token))
    }

    // =================================================================
    // Administration
    // =================================================================

    pub fn update_settlement_contract(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::SettlementContractUpdated {
            previous: self.settlement_contract,
            next,
        });
        self.settlement_contract = next;
        Ok(())
    }

    pub fn update_broker_verifier(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::BrokerVerifierUpdated {
            previous: self.broker_verifier,
            next,
        });
        self.broker_verifier = next;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<()> {
        self.ownable
            .transfer_ownership(ctx, new_owner, &mut self.events)
    }

    fn set_balance(&mut self, trader: Address, token: Address, value: Amount) {
        let tokens = self.trader_tokens.entry(trader).or_default();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
        self.balances.insert((trader, token), value);
    }
}

impl SettlementLedger for BalanceLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn balance(&self, trader: Address, token: Address) -> Amount {
        self.balances
            .get(&(trader, token))
            .copied()
            .unwrap_or_default()
    }

    fn transfer_balance_with_fee(
        &mut self,
        ctx: &CallContext,
        transfer: &FeeTransfer,
    ) -> Result<()> {
        if ctx.sender != self.settlement_contract {
            tracing::warn!(caller = %ctx.sender, "Fee transfer rejected: not the settlement contract");
            return Err(DarkpoolError::Unauthorized {
                caller: ctx.sender,
                operation: "transfer_balance_with_fee",
            });
        }
        let FeeTransfer {
            from,
            to,
            token,
            value,
            fee,
            fee_payee,
        } = *transfer;

        let total = checked_add(value, fee)?;
        let from_balance = checked_sub(self.balance(from, token), total)?;
        // Compute every cell before writing any, so overflow leaves no trace.
        let mut next: HashMap<Address, Amount> = HashMap::new();
        next.insert(from, from_balance);
        let to_balance = checked_add(
            next.get(&to)
                .copied()
                .unwrap_or_else(|| self.balance(to, token)),
            value,
        )?;
        next.insert(to, to_balance);
        let payee_balance = checked_add(
            next.get(&fee_payee)
                .copied()
                .unwrap_or_else(|| self.balance(fee_payee, token)),
            fee,
        )?;
        next.insert(fee_payee, payee_balance);
        for (who, amount) in next {
            self.set_balance(who, token, amount);
        }

        tracing::debug!(
            from = %from,
            to = %to,
            token = %token,
            value = %value,
            fee = %fee,
            "Balance transferred with fee"
        );
        self.events.emit(Event::BalanceDecreased {
            trader: from,
            token,
            value: total,
        });
        self.events.emit(Event::BalanceIncreased {
            trader: to,
            token,
            value,
        });
        if !fee.is_zero() {
            self.events.emit(Event::BalanceIncreased {
                trader: fee_payee,
                token,
                value: fee,
            });
        }
        Ok(())
    }
}
