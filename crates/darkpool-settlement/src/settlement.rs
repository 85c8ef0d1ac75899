//! The settlement engine.
//!
//! ## Submission
//!
//! The orderbook only knows order hashes. A trader reveals an order by
//! submitting its [`OrderDetails`] with the prefix it signed; the engine
//! re-derives the id and accepts the details if that id is Open or
//! Confirmed in the orderbook.
//!
//! ## Matching
//!
//! The buy order is the priority side. For a confirmed pair trading
//! `priority/secondary` at prices `pb >= ps`:
//!
//! ```text
//!   mid       = (pb + ps) / 2
//!   common    = min(buy.volume, sell.volume)
//!   priority  = mid × common × 10^priority_decimals / 10^(PRICE_DECIMALS + VOLUME_DECIMALS)
//!   secondary = common × 10^secondary_decimals / 10^VOLUME_DECIMALS
//! ```
//!
//! The buyer pays `priority` and the seller pays `secondary`. Each leg is
//! split with [`darknode_fee_split`]: the counterparty receives the net
//! amount and the fee goes to the reward vault, attributed to the
//! confirming darknode.
//!
//! ## Atomicity
//!
//! Fees are attributed and both orders are marked `Settled` before the
//! ledger is touched. If a ledger leg fails, the legs already applied are
//! reversed and the engine's own changes undone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use darkpool_ledger::{FeeTransfer, SettlementLedger, TokenMetadata};
use darkpool_orderbook::Orderbook;
use darkpool_registry::DarknodeRegistry;
use darkpool_types::constants::{PRICE_DECIMALS, VOLUME_DECIMALS};
use darkpool_types::{
    Address, Amount, CallContext, DarkpoolError, Erc20, Event, EventLog, OrderDetails, OrderId,
    OrderParity, OrderState, Ownable, Pausable, Result, SettlementConfig, darknode_fee_split,
    mul_div, pow10,
};

use crate::reward_vault::RewardVault;

/// Where an order stands in the settlement engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Details not submitted.
    #[default]
    None,
    Submitted,
    Settled,
    /// Proven fraudulent; can never settle.
    Slashed,
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Slashed => write!(f, "SLASHED"),
        }
    }
}

/// Read-only projection of a match, from one order's point of view.
///
/// Volumes are the net amounts each counterparty receives; the fees are
/// what the reward vault receives on each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDetails {
    pub settled: bool,
    pub order_is_buy: bool,
    pub matched_id: OrderId,
    pub priority_volume: Amount,
    pub secondary_volume: Amount,
    pub priority_fee: Amount,
    pub secondary_fee: Amount,
    pub priority_token: Address,
    pub secondary_token: Address,
    /// The buyer, who pays the priority token.
    pub priority_trader: Address,
    /// The seller, who pays the secondary token.
    pub secondary_trader: Address,
}

/// Components the engine reads from or writes to during a call.
///
/// Each must be the instance the engine is configured with.
pub struct Collaborators<'a> {
    pub orderbook: &'a Orderbook,
    pub tokens: &'a dyn TokenMetadata,
    pub ledger: &'a mut dyn SettlementLedger,
    pub vault: &'a mut RewardVault,
}

/// One leg of a match in a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Leg {
    token: Address,
    net: Amount,
    fee: Amount,
}

/// A validated buy/sell pair with its computed legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MatchRecord {
    buy: OrderId,
    sell: OrderId,
    buyer: Address,
    seller: Address,
    priority: Leg,
    secondary: Leg,
}

impl MatchRecord {
    /// Buyer pays the priority leg, seller pays the secondary leg.
    fn transfers(&self, fee_payee: Address) -> [FeeTransfer; 2] {
        [
            FeeTransfer {
                from: self.buyer,
                to: self.seller,
                token: self.priority.token,
                value: self.priority.net,
                fee: self.priority.fee,
                fee_payee,
            },
            FeeTransfer {
                from: self.seller,
                to: self.buyer,
                token: self.secondary.token,
                value: self.secondary.net,
                fee: self.secondary.fee,
                fee_payee,
            },
        ]
    }

    fn fees(&self) -> [(Address, Amount); 2] {
        [
            (self.priority.token, self.priority.fee),
            (self.secondary.token, self.secondary.fee),
        ]
    }

    fn details_for(&self, id: OrderId, settled: bool) -> MatchDetails {
        let order_is_buy = id == self.buy;
        MatchDetails {
            settled,
            order_is_buy,
            matched_id: if order_is_buy { self.sell } else { self.buy },
            priority_volume: self.priority.net,
            secondary_volume: self.secondary.net,
            priority_fee: self.priority.fee,
            secondary_fee: self.secondary.fee,
            priority_token: self.priority.token,
            secondary_token: self.secondary.token,
            priority_trader: self.buyer,
            secondary_trader: self.seller,
        }
    }
}

/// A settled match, kept for auditing and slash reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SettledMatch {
    record: MatchRecord,
    darknode: Address,
    /// Vault account the fees were credited to.
    fee_payee: Address,
}

/// Validates confirmed matches and moves balances between their traders.
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    address: Address,
    ownable: Ownable,
    pausable: Pausable,

    orderbook: Address,
    darknode_registry: Address,
    token_registry: Address,
    balances: Address,
    reward_vault: Address,
    settlement_id: u64,
    submission_gas_price_limit: u64,
    slasher: Option<Address>,

    details: HashMap<OrderId, OrderDetails>,
    statuses: HashMap<OrderId, SettlementStatus>,
    /// Keyed by both the buy and the sell id.
    matches: HashMap<OrderId, SettledMatch>,
    events: EventLog,
}

impl SettlementEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        address: Address,
        owner: Address,
        orderbook: Address,
        darknode_registry: Address,
        token_registry: Address,
        balances: Address,
        reward_vault: Address,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            address,
            ownable: Ownable::new(owner),
            pausable: Pausable::default(),
            orderbook,
            darknode_registry,
            token_registry,
            balances,
            reward_vault,
            settlement_id: config.settlement_id,
            submission_gas_price_limit: config.submission_gas_price_limit,
            slasher: config.slasher,
            details: HashMap::new(),
            statuses: HashMap::new(),
            matches: HashMap::new(),
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn owner(&self) -> Option<Address> {
        self.ownable.owner()
    }

    // =================================================================
    // Submission
    // =================================================================

    /// Reveal the details of an order opened in `orderbook`. Returns the
    /// order id the details hash to.
    pub fn submit_order(
        &mut self,
        ctx: &CallContext,
        orderbook: &Orderbook,
        prefix: &[u8],
        details: OrderDetails,
    ) -> Result<OrderId> {
        self.pausable.require_not_paused()?;
        if orderbook.address() != self.orderbook {
            return Err(DarkpoolError::Unauthorized {
                caller: orderbook.address(),
                operation: "submit_order",
            });
        }
        if ctx.gas_price > self.submission_gas_price_limit {
            tracing::warn!(
                caller = %ctx.sender,
                gas_price = ctx.gas_price,
                limit = self.submission_gas_price_limit,
                "Submission rejected: gas price above limit"
            );
            return Err(DarkpoolError::GasPriceTooHigh {
                gas_price: ctx.gas_price,
                limit: self.submission_gas_price_limit,
            });
        }
        if details.settlement_id.0 != self.settlement_id {
            return Err(DarkpoolError::InvalidSettlementId(details.settlement_id.0));
        }

        let id = details.order_id(prefix);
        match self.order_status(id) {
            SettlementStatus::None => {}
            SettlementStatus::Slashed => return Err(DarkpoolError::OrderSlashed(id)),
            SettlementStatus::Submitted | SettlementStatus::Settled => {
                return Err(DarkpoolError::OrderAlreadySubmitted(id));
            }
        }
        let state = orderbook.order_state(id);
        if !matches!(state, OrderState::Open | OrderState::Confirmed) {
            return Err(DarkpoolError::WrongOrderState {
                id,
                expected: OrderState::Open,
                actual: state,
            });
        }

        self.details.insert(id, details);
        self.statuses.insert(id, SettlementStatus::Submitted);
        tracing::info!(order = %id.short(), tokens = %details.tokens, "Order details submitted");
        self.events.emit(Event::OrderSubmitted { id });
        Ok(id)
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle the confirmed pair `buy`/`sell`.
    pub fn settle(
        &mut self,
        ctx: &CallContext,
        c: &mut Collaborators<'_>,
        buy: OrderId,
        sell: OrderId,
    ) -> Result<()> {
        self.pausable.require_not_paused()?;
        self.check_collaborators(c)?;
        for id in [buy, sell] {
            self.require_settleable(id)?;
            let state = c.orderbook.order_state(id);
            if state != OrderState::Confirmed {
                return Err(DarkpoolError::WrongOrderState {
                    id,
                    expected: OrderState::Confirmed,
                    actual: state,
                });
            }
        }
        if c.orderbook.order_match(buy) != Some(sell) || c.orderbook.order_match(sell) != Some(buy)
        {
            return Err(DarkpoolError::OrdersNotMatched(buy, sell));
        }

        let record = self.compute_match(c.orderbook, c.tokens, buy, sell)?;
        let darknode = c
            .orderbook
            .order_confirmer(buy)
            .ok_or_else(|| DarkpoolError::Internal(format!("order {buy} has no confirmer")))?;
        let fee_payee = c.vault.address();
        let as_engine = ctx.forward(self.address);

        attribute_fees(c.vault, &as_engine, darknode, &record.fees())?;
        self.set_status(&[buy, sell], SettlementStatus::Settled);
        if let Err(e) = apply_transfers(c.ledger, &as_engine, &record.transfers(fee_payee)) {
            tracing::warn!(buy = %buy.short(), sell = %sell.short(), error = %e, "Settlement failed");
            self.set_status(&[buy, sell], SettlementStatus::Submitted);
            reclaim_fees(c.vault, &as_engine, darknode, &record.fees());
            return Err(e);
        }

        let settled = SettledMatch {
            record,
            darknode,
            fee_payee,
        };
        self.matches.insert(buy, settled);
        self.matches.insert(sell, settled);

        tracing::info!(
            buy = %buy.short(),
            sell = %sell.short(),
            darknode = %darknode,
            priority_volume = %record.priority.net,
            secondary_volume = %record.secondary.net,
            "Orders settled"
        );
        self.events.emit(Event::OrderSettled { buy, sell });
        Ok(())
    }

    /// Validate the pair and compute both legs. Reads only.
    fn compute_match(
        &self,
        orderbook: &Orderbook,
        tokens: &dyn TokenMetadata,
        buy: OrderId,
        sell: OrderId,
    ) -> Result<MatchRecord> {
        let b = self.submitted_details(buy)?;
        let s = self.submitted_details(sell)?;

        if orderbook.order_parity(buy) != Some(OrderParity::Buy)
            || orderbook.order_parity(sell) != Some(OrderParity::Sell)
        {
            return Err(incompatible("expected a buy order and a sell order"));
        }
        if b.tokens != s.tokens {
            return Err(incompatible(format!(
                "token pairs differ: {} vs {}",
                b.tokens, s.tokens
            )));
        }
        let (priority_code, secondary_code) = (b.tokens.priority(), b.tokens.secondary());
        if priority_code == secondary_code {
            return Err(incompatible(format!(
                "pair {} trades a token against itself",
                b.tokens
            )));
        }
        let priority_token = tokens.registered_token(priority_code)?;
        let secondary_token = tokens.registered_token(secondary_code)?;
        if b.price < s.price {
            return Err(incompatible(format!(
                "buy price {} below sell price {}",
                b.price, s.price
            )));
        }
        let common = b.volume.min(s.volume);
        if common < b.minimum_volume || common < s.minimum_volume {
            return Err(incompatible(format!(
                "volume {common} below a minimum volume"
            )));
        }

        let mid = (Amount::from(b.price) + Amount::from(s.price)) / 2;
        let common = Amount::from(common);
        let priority_gross = mul_div(
            mid.checked_mul(common)
                .ok_or(DarkpoolError::ArithmeticOverflow)?,
            pow10(u32::from(priority_token.decimals))?,
            pow10(PRICE_DECIMALS + VOLUME_DECIMALS)?,
        )?;
        let secondary_gross = mul_div(
            common,
            pow10(u32::from(secondary_token.decimals))?,
            pow10(VOLUME_DECIMALS)?,
        )?;
        if priority_gross.is_zero() || secondary_gross.is_zero() {
            return Err(incompatible("settlement volume rounds to zero"));
        }

        let (priority_net, priority_fee) = darknode_fee_split(priority_gross)?;
        let (secondary_net, secondary_fee) = darknode_fee_split(secondary_gross)?;
        tracing::debug!(
            buy = %buy.short(),
            sell = %sell.short(),
            mid = %mid,
            priority_gross = %priority_gross,
            priority_fee = %priority_fee,
            secondary_gross = %secondary_gross,
            secondary_fee = %secondary_fee,
            "Match computed"
        );

        let trader = |id: OrderId| {
            orderbook
                .order_trader(id)
                .ok_or_else(|| DarkpoolError::Internal(format!("order {id} has no trader")))
        };
        Ok(MatchRecord {
            buy,
            sell,
            buyer: trader(buy)?,
            seller: trader(sell)?,
            priority: Leg {
                token: priority_token.address,
                net: priority_net,
                fee: priority_fee,
            },
            secondary: Leg {
                token: secondary_token.address,
                net: secondary_net,
                fee: secondary_fee,
            },
        })
    }

    /// The match `id` belongs to. Settled matches report what was moved;
    /// unsettled ones report what settling would move now.
    pub fn get_match_details(
        &self,
        orderbook: &Orderbook,
        tokens: &dyn TokenMetadata,
        id: OrderId,
    ) -> Result<MatchDetails> {
        if let Some(settled) = self.matches.get(&id) {
            return Ok(settled.record.details_for(id, true));
        }
        self.require_settleable(id)?;
        let matched = orderbook
            .order_match(id)
            .ok_or(DarkpoolError::WrongOrderState {
                id,
                expected: OrderState::Confirmed,
                actual: orderbook.order_state(id),
            })?;
        let (buy, sell) = match orderbook.order_parity(id) {
            Some(OrderParity::Buy) => (id, matched),
            _ => (matched, id),
        };
        Ok(self
            .compute_match(orderbook, tokens, buy, sell)?
            .details_for(id, false))
    }

    // =================================================================
    // Slashing
    // =================================================================

    /// Punish the darknode that confirmed `guilty`. Slasher only.
    ///
    /// If the pair settled, both legs are reversed and the fees still
    /// attributed to the darknode are returned to the payers. The
    /// darknode's bond is slashed in `registry` in favour of the two
    /// challengers, and both orders become `Slashed`.
    pub fn slash(
        &mut self,
        ctx: &CallContext,
        c: &mut Collaborators<'_>,
        registry: &mut DarknodeRegistry,
        erc20: &mut dyn Erc20,
        guilty: OrderId,
        challengers: (Address, Address),
    ) -> Result<()> {
        if self.slasher != Some(ctx.sender) {
            tracing::warn!(caller = %ctx.sender, order = %guilty.short(), "Unauthorized slash rejected");
            return Err(DarkpoolError::NotSlasher { caller: ctx.sender });
        }
        self.check_collaborators(c)?;
        self.check_registry(registry, "slash")?;
        let state = c.orderbook.order_state(guilty);
        if state != OrderState::Confirmed {
            return Err(DarkpoolError::WrongOrderState {
                id: guilty,
                expected: OrderState::Confirmed,
                actual: state,
            });
        }
        if self.order_status(guilty) == SettlementStatus::Slashed {
            return Err(DarkpoolError::OrderSlashed(guilty));
        }
        let innocent = c
            .orderbook
            .order_match(guilty)
            .ok_or_else(|| DarkpoolError::Internal(format!("order {guilty} has no match")))?;
        let darknode = c
            .orderbook
            .order_confirmer(guilty)
            .ok_or_else(|| DarkpoolError::Internal(format!("order {guilty} has no confirmer")))?;
        let as_engine = ctx.forward(self.address);

        // Reverse the settled legs, if any.
        let mut reclaimed: Vec<(Address, Amount)> = Vec::new();
        let mut reversals: Vec<FeeTransfer> = Vec::new();
        if let Some(settled) = self.matches.get(&guilty).copied() {
            let fees = if c.vault.address() == settled.fee_payee {
                reclaim_attributed(c.vault, &as_engine, settled.darknode, &settled.record.fees())?
            } else {
                tracing::warn!(
                    order = %guilty.short(),
                    vault = %settled.fee_payee,
                    "Fees were paid to a replaced reward vault and are not reversed"
                );
                vec![]
            };
            for leg in settled.record.transfers(settled.fee_payee) {
                let fee = fees
                    .iter()
                    .find(|(token, _)| *token == leg.token)
                    .map_or(Amount::zero(), |(_, fee)| *fee);
                let charged = FeeTransfer { fee, ..leg };
                reversals.extend(charged.reversed().into_iter().filter(|t| !t.value.is_zero()));
            }
            if let Err(e) = apply_transfers(c.ledger, &as_engine, &reversals) {
                attribute_fees_best_effort(c.vault, &as_engine, settled.darknode, &fees);
                return Err(e);
            }
            reclaimed = fees;
        }

        if registry.darknode(darknode).is_some() {
            if let Err(e) =
                registry.slash(&as_engine, erc20, darknode, challengers.0, challengers.1)
            {
                revert_transfers(c.ledger, &as_engine, &reversals);
                attribute_fees_best_effort(c.vault, &as_engine, darknode, &reclaimed);
                return Err(e);
            }
        } else {
            tracing::warn!(darknode = %darknode, "Confirming darknode has no bond left to slash");
        }

        self.set_status(&[guilty, innocent], SettlementStatus::Slashed);
        self.matches.remove(&guilty);
        self.matches.remove(&innocent);

        tracing::info!(
            guilty = %guilty.short(),
            innocent = %innocent.short(),
            darknode = %darknode,
            reversed = !reversals.is_empty(),
            "Order slashed"
        );
        self.events.emit(Event::OrderSlashed { guilty, innocent });
        Ok(())
    }

    // =================================================================
    // Darknode rewards
    // =================================================================

    /// Move `darknode`'s accrued `token` fees from the vault's ledger
    /// account to its owner's. Only the darknode's owner may call.
    pub fn withdraw_reward(
        &mut self,
        ctx: &CallContext,
        c: &mut Collaborators<'_>,
        registry: &DarknodeRegistry,
        darknode: Address,
        token: Address,
    ) -> Result<Amount> {
        self.check_collaborators(c)?;
        self.check_registry(registry, "withdraw_reward")?;
        let owner = registry
            .darknode_owner(darknode)
            .ok_or(DarkpoolError::DarknodeNotFound(darknode))?;
        if ctx.sender != owner {
            return Err(DarkpoolError::NotDarknodeOwner {
                caller: ctx.sender,
                node: darknode,
            });
        }

        let as_engine = ctx.forward(self.address);
        let value = c.vault.take(&as_engine, darknode, token)?;
        if value.is_zero() {
            return Ok(value);
        }
        let transfer = FeeTransfer {
            from: c.vault.address(),
            to: owner,
            token,
            value,
            fee: Amount::zero(),
            fee_payee: c.vault.address(),
        };
        if let Err(e) = c.ledger.transfer_balance_with_fee(&as_engine, &transfer) {
            attribute_fees_best_effort(c.vault, &as_engine, darknode, &[(token, value)]);
            return Err(e);
        }

        tracing::info!(darknode = %darknode, owner = %owner, token = %token, value = %value, "Reward withdrawn");
        self.events.emit(Event::RewardWithdrawn {
            darknode,
            owner,
            token,
            value,
        });
        Ok(value)
    }

    // =================================================================
    // Administration
    // =================================================================

    pub fn update_orderbook(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::OrderbookUpdated {
            previous: self.orderbook,
            next,
        });
        self.orderbook = next;
        Ok(())
    }

    pub fn update_darknode_registry(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::DarknodeRegistryUpdated {
            previous: self.darknode_registry,
            next,
        });
        self.darknode_registry = next;
        Ok(())
    }

    pub fn update_token_registry(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::TokenRegistryUpdated {
            previous: self.token_registry,
            next,
        });
        self.token_registry = next;
        Ok(())
    }

    pub fn update_balances(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::BalancesUpdated {
            previous: self.balances,
            next,
        });
        self.balances = next;
        Ok(())
    }

    pub fn update_reward_vault(&mut self, ctx: &CallContext, next: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::RewardVaultUpdated {
            previous: self.reward_vault,
            next,
        });
        self.reward_vault = next;
        Ok(())
    }

    pub fn update_submission_gas_price_limit(
        &mut self,
        ctx: &CallContext,
        next: u64,
    ) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::SubmissionGasPriceLimitUpdated {
            previous: self.submission_gas_price_limit,
            next,
        });
        self.submission_gas_price_limit = next;
        Ok(())
    }

    pub fn update_slasher(&mut self, ctx: &CallContext, next: Option<Address>) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::SlasherUpdated {
            previous: self.slasher,
            next,
        });
        self.slasher = next;
        Ok(())
    }

    pub fn pause(&mut self, ctx: &CallContext) -> Result<()> {
        self.pausable.pause(ctx, &self.ownable, &mut self.events)
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> Result<()> {
        self.pausable.unpause(ctx, &self.ownable, &mut self.events)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<()> {
        self.ownable
            .transfer_ownership(ctx, new_owner, &mut self.events)
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn order_status(&self, id: OrderId) -> SettlementStatus {
        self.statuses.get(&id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn order_details(&self, id: OrderId) -> Option<&OrderDetails> {
        self.details.get(&id)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pausable.is_paused()
    }

    #[must_use]
    pub fn settlement_id(&self) -> u64 {
        self.settlement_id
    }

    #[must_use]
    pub fn submission_gas_price_limit(&self) -> u64 {
        self.submission_gas_price_limit
    }

    #[must_use]
    pub fn slasher(&self) -> Option<Address> {
        self.slasher
    }

    #[must_use]
    pub fn orderbook(&self) -> Address {
        self.orderbook
    }

    #[must_use]
    pub fn darknode_registry(&self) -> Address {
        self.darknode_registry
    }

    #[must_use]
    pub fn token_registry(&self) -> Address {
        self.token_registry
    }

    #[must_use]
    pub fn balances(&self) -> Address {
        self.balances
    }

    #[must_use]
    pub fn reward_vault(&self) -> Address {
        self.reward_vault
    }

    // =================================================================
    // Internal
    // =================================================================

    fn require_settleable(&self, id: OrderId) -> Result<()> {
        match self.order_status(id) {
            SettlementStatus::Submitted => Ok(()),
            SettlementStatus::None => Err(DarkpoolError::OrderNotSubmitted(id)),
            SettlementStatus::Settled => Err(DarkpoolError::AlreadySettled(id)),
            SettlementStatus::Slashed => Err(DarkpoolError::OrderSlashed(id)),
        }
    }

    fn submitted_details(&self, id: OrderId) -> Result<OrderDetails> {
        self.details
            .get(&id)
            .copied()
            .ok_or(DarkpoolError::OrderNotSubmitted(id))
    }

    fn set_status(&mut self, ids: &[OrderId], status: SettlementStatus) {
        for id in ids {
            self.statuses.insert(*id, status);
        }
    }

    fn check_collaborators(&self, c: &Collaborators<'_>) -> Result<()> {
        let wiring = [
            (c.orderbook.address(), self.orderbook, "orderbook"),
            (c.tokens.address(), self.token_registry, "token_registry"),
            (c.ledger.address(), self.balances, "balances"),
            (c.vault.address(), self.reward_vault, "reward_vault"),
        ];
        for (actual, expected, role) in wiring {
            if actual != expected {
                tracing::warn!(role, actual = %actual, expected = %expected, "Unexpected collaborator");
                return Err(DarkpoolError::Unauthorized {
                    caller: actual,
                    operation: role,
                });
            }
        }
        if c.vault.settlement() != self.address {
            return Err(DarkpoolError::Configuration(format!(
                "reward vault {} serves settlement engine {}",
                c.vault.address(),
                c.vault.settlement()
            )));
        }
        Ok(())
    }

    fn check_registry(&self, registry: &DarknodeRegistry, operation: &'static str) -> Result<()> {
        if registry.address() != self.darknode_registry {
            return Err(DarkpoolError::Unauthorized {
                caller: registry.address(),
                operation,
            });
        }
        Ok(())
    }
}

fn incompatible(reason: impl Into<String>) -> DarkpoolError {
    DarkpoolError::IncompatibleOrders {
        reason: reason.into(),
    }
}

/// Apply `transfers` in order. If one fails, the ones already applied are
/// reversed before the error is returned.
fn apply_transfers(
    ledger: &mut dyn SettlementLedger,
    ctx: &CallContext,
    transfers: &[FeeTransfer],
) -> Result<()> {
    for (applied, transfer) in transfers.iter().enumerate() {
        if let Err(e) = ledger.transfer_balance_with_fee(ctx, transfer) {
            revert_transfers(ledger, ctx, &transfers[..applied]);
            return Err(e);
        }
    }
    Ok(())
}

/// Undo `applied` transfers, newest first.
fn revert_transfers(ledger: &mut dyn SettlementLedger, ctx: &CallContext, applied: &[FeeTransfer]) {
    for transfer in applied.iter().rev() {
        for undo in transfer.reversed() {
            if undo.value.is_zero() {
                continue;
            }
            if let Err(e) = ledger.transfer_balance_with_fee(ctx, &undo) {
                tracing::error!(from = %undo.from, to = %undo.to, token = %undo.token, error = %e, "Transfer reversal failed");
            }
        }
    }
}

/// Attribute each `(token, fee)` to `darknode`, all or nothing.
fn attribute_fees(
    vault: &mut RewardVault,
    ctx: &CallContext,
    darknode: Address,
    fees: &[(Address, Amount)],
) -> Result<()> {
    for (done, (token, fee)) in fees.iter().enumerate() {
        if let Err(e) = vault.deposit(ctx, darknode, *token, *fee) {
            reclaim_fees(vault, ctx, darknode, &fees[..done]);
            return Err(e);
        }
    }
    Ok(())
}

/// Put fees back after a failed call.
fn attribute_fees_best_effort(
    vault: &mut RewardVault,
    ctx: &CallContext,
    darknode: Address,
    fees: &[(Address, Amount)],
) {
    for (token, fee) in fees {
        if let Err(e) = vault.deposit(ctx, darknode, *token, *fee) {
            tracing::error!(darknode = %darknode, token = %token, error = %e, "Fee restore failed");
        }
    }
}

/// Take back fees attributed earlier in a failed call.
fn reclaim_fees(
    vault: &mut RewardVault,
    ctx: &CallContext,
    darknode: Address,
    fees: &[(Address, Amount)],
) {
    for (token, fee) in fees {
        if let Err(e) = vault.reclaim(ctx, darknode, *token, *fee) {
            tracing::error!(darknode = %darknode, token = %token, error = %e, "Fee reclaim failed");
        }
    }
}

/// Reclaim up to each fee from `darknode`'s attribution, returning what
/// was actually reclaimed per token.
fn reclaim_attributed(
    vault: &mut RewardVault,
    ctx: &CallContext,
    darknode: Address,
    fees: &[(Address, Amount)],
) -> Result<Vec<(Address, Amount)>> {
    let mut reclaimed = Vec::with_capacity(fees.len());
    for (token, fee) in fees {
        match vault.reclaim(ctx, darknode, *token, *fee) {
            Ok(value) => reclaimed.push((*token, value)),
            Err(e) => {
                attribute_fees_best_effort(vault, ctx, darknode, &reclaimed);
                return Err(e);
            }
        }
    }
    Ok(reclaimed)
}
