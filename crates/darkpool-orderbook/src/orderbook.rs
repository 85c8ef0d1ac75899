//! Order state machine and confirmation protocol.
//!
//! ## Opening
//!
//! A broker opens an order on behalf of a trader by presenting the
//! trader's signature over [`open_message`]. The signer becomes the
//! order's trader; the caller pays the opening fee.
//!
//! ## Confirmation
//!
//! A darknode in the current cohort, sitting in a pod of at least the
//! minimum size, pairs an open buy with an open sell. Both become
//! `Confirmed` and reference each other; the mapping is set exactly once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use darkpool_registry::DarknodeRegistry;
use darkpool_types::constants::MAX_PAGE_SIZE;
use darkpool_types::{
    Address, Amount, BlockNumber, CallContext, DarkpoolError, Erc20, Event, EventLog, Order,
    OrderId, OrderParity, OrderState, OrderbookConfig, Ownable, Pausable, Result,
    SignatureVerifier, cancel_message, open_message,
};

/// Parallel arrays describing a page of orders, in opening order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub ids: Vec<OrderId>,
    pub traders: Vec<Address>,
    /// `None` until the order is confirmed.
    pub confirmers: Vec<Option<Address>>,
    pub states: Vec<u8>,
}

/// The orderbook.
#[derive(Debug, Clone)]
pub struct Orderbook {
    address: Address,
    ownable: Ownable,
    pausable: Pausable,
    /// Registry whose darknodes may confirm orders.
    darknode_registry: Address,
    fee_token: Address,
    order_opening_fee: Amount,

    orders: HashMap<OrderId, Order>,
    buy_orders: Vec<OrderId>,
    sell_orders: Vec<OrderId>,
    /// Every order in opening order; position + 1 is the order's priority.
    all_orders: Vec<OrderId>,
    events: EventLog,
}

impl Orderbook {
    #[must_use]
    pub fn new(
        address: Address,
        owner: Address,
        darknode_registry: Address,
        config: &OrderbookConfig,
    ) -> Self {
        Self {
            address,
            ownable: Ownable::new(owner),
            pausable: Pausable::default(),
            darknode_registry,
            fee_token: config.fee_token,
            order_opening_fee: config.order_opening_fee,
            orders: HashMap::new(),
            buy_orders: Vec::new(),
            sell_orders: Vec::new(),
            all_orders: Vec::new(),
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
    // Order lifecycle
    // =================================================================

    pub fn open_buy_order(
        &mut self,
        ctx: &CallContext,
        verifier: &dyn SignatureVerifier,
        erc20: &mut dyn Erc20,
        signature: &[u8],
        order_id: OrderId,
    ) -> Result<()> {
        self.open_order(ctx, verifier, erc20, signature, order_id, OrderParity::Buy)
    }

    pub fn open_sell_order(
        &mut self,
        ctx: &CallContext,
        verifier: &dyn SignatureVerifier,
        erc20: &mut dyn Erc20,
        signature: &[u8],
        order_id: OrderId,
    ) -> Result<()> {
        self.open_order(ctx, verifier, erc20, signature, order_id, OrderParity::Sell)
    }

    fn open_order(
        &mut self,
        ctx: &CallContext,
        verifier: &dyn SignatureVerifier,
        erc20: &mut dyn Erc20,
        signature: &[u8],
        order_id: OrderId,
        parity: OrderParity,
    ) -> Result<()> {
        self.pausable.require_not_paused()?;
        if self.orders.contains_key(&order_id) {
            return Err(DarkpoolError::WrongOrderState {
                id: order_id,
                expected: OrderState::Undefined,
                actual: self.order_state(order_id),
            });
        }

        let trader = verifier
            .recover(&open_message(&order_id), signature)
            .inspect_err(|e| {
                tracing::warn!(order = %order_id.short(), error = %e, "Open rejected: bad signature");
            })?;

        let priority = self.all_orders.len() as u64 + 1;
        self.orders.insert(
            order_id,
            Order {
                id: order_id,
                parity,
                state: OrderState::Open,
                trader,
                broker: ctx.sender,
                confirmer: None,
                matched_order: None,
                block_number: ctx.block_number,
                priority,
            },
        );
        self.all_orders.push(order_id);
        let side = match parity {
            OrderParity::Buy => &mut self.buy_orders,
            OrderParity::Sell => &mut self.sell_orders,
        };
        side.push(order_id);

        if !self.order_opening_fee.is_zero() {
            if let Err(e) = erc20.transfer_from(
                self.fee_token,
                self.address,
                ctx.sender,
                self.address,
                self.order_opening_fee,
            ) {
                self.orders.remove(&order_id);
                self.all_orders.pop();
                match parity {
                    OrderParity::Buy => self.buy_orders.pop(),
                    OrderParity::Sell => self.sell_orders.pop(),
                };
                return Err(e);
            }
        }

        tracing::info!(
            order = %order_id.short(),
            trader = %trader,
            broker = %ctx.sender,
            parity = %parity,
            priority,
            "Order opened"
        );
        self.events.emit(Event::OrderOpened {
            id: order_id,
            trader,
            buy: parity == OrderParity::Buy,
        });
        Ok(())
    }

    /// Cancel an open order. The signature over [`cancel_message`] must
    /// come from the order's trader.
    pub fn cancel_order(
        &mut self,
        verifier: &dyn SignatureVerifier,
        signature: &[u8],
        order_id: OrderId,
    ) -> Result<()> {
        let order = self.require_state(order_id, OrderState::Open)?;
        let trader = order.trader;

        let signer = verifier.recover(&cancel_message(&order_id), signature)?;
        if signer != trader {
            tracing::warn!(order = %order_id.short(), signer = %signer, "Cancel rejected: not the trader");
            return Err(DarkpoolError::InvalidSignature {
                reason: format!("cancel signed by {signer}, order belongs to {trader}"),
            });
        }

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.state = OrderState::Canceled;
        }
        tracing::info!(order = %order_id.short(), "Order canceled");
        self.events.emit(Event::OrderCanceled { id: order_id });
        Ok(())
    }

    /// Confirm `order_id` against `matched_order_id`. The caller must be a
    /// darknode in the current cohort of `registry` and belong to a pod.
    pub fn confirm_order(
        &mut self,
        ctx: &CallContext,
        registry: &DarknodeRegistry,
        order_id: OrderId,
        matched_order_id: OrderId,
    ) -> Result<()> {
        if registry.address() != self.darknode_registry {
            return Err(DarkpoolError::Unauthorized {
                caller: registry.address(),
                operation: "confirm_order",
            });
        }
        let darknode = ctx.sender;
        if !registry.is_registered(darknode) {
            tracing::warn!(caller = %darknode, "Confirm rejected: not a registered darknode");
            return Err(DarkpoolError::NotRegisteredDarknode(darknode));
        }
        if registry.pod_of(darknode).is_none() {
            return Err(DarkpoolError::PodTooSmall {
                node: darknode,
                minimum: registry.minimum_pod_size(),
            });
        }

        let parity = self.require_state(order_id, OrderState::Open)?.parity;
        let matched_parity = self.require_state(matched_order_id, OrderState::Open)?.parity;
        if order_id == matched_order_id || parity == matched_parity {
            return Err(DarkpoolError::SameParity(order_id, matched_order_id));
        }

        for (id, matched) in [(order_id, matched_order_id), (matched_order_id, order_id)] {
            if let Some(order) = self.orders.get_mut(&id) {
                order.state = OrderState::Confirmed;
                order.matched_order = Some(matched);
                order.confirmer = Some(darknode);
            }
        }

        tracing::info!(
            order = %order_id.short(),
            matched = %matched_order_id.short(),
            darknode = %darknode,
            "Orders confirmed"
        );
        self.events.emit(Event::OrderConfirmed {
            id: order_id,
            matched: matched_order_id,
            darknode,
        });
        Ok(())
    }

    fn require_state(&self, id: OrderId, expected: OrderState) -> Result<&Order> {
        let actual = self.order_state(id);
        if actual != expected {
            return Err(DarkpoolError::WrongOrderState {
                id,
                expected,
                actual,
            });
        }
        self.orders
            .get(&id)
            .ok_or(DarkpoolError::Internal(format!("order {id} missing")))
    }

    // =================================================================
    // Administration
    // =================================================================

    pub fn update_order_opening_fee(&mut self, ctx: &CallContext, fee: Amount) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::OrderOpeningFeeUpdated {
            previous: self.order_opening_fee,
            next: fee,
        });
        self.order_opening_fee = fee;
        Ok(())
    }

    pub fn update_darknode_registry(&mut self, ctx: &CallContext, registry: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.events.emit(Event::DarknodeRegistryUpdated {
            previous: self.darknode_registry,
            next: registry,
        });
        self.darknode_registry = registry;
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

    #[must_use]
    pub fn order_opening_fee(&self) -> Amount {
        self.order_opening_fee
    }

    #[must_use]
    pub fn darknode_registry(&self) -> Address {
        self.darknode_registry
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pausable.is_paused()
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn get_order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// `Undefined` for unknown orders.
    #[must_use]
    pub fn order_state(&self, id: OrderId) -> OrderState {
        self.orders
            .get(&id)
            .map_or(OrderState::Undefined, |o| o.state)
    }

    /// The order confirmed against `id`.
    #[must_use]
    pub fn order_match(&self, id: OrderId) -> Option<OrderId> {
        self.orders.get(&id).and_then(|o| o.matched_order)
    }

    #[must_use]
    pub fn order_parity(&self, id: OrderId) -> Option<OrderParity> {
        self.orders.get(&id).map(|o| o.parity)
    }

    #[must_use]
    pub fn order_trader(&self, id: OrderId) -> Option<Address> {
        self.orders.get(&id).map(|o| o.trader)
    }

    #[must_use]
    pub fn order_broker(&self, id: OrderId) -> Option<Address> {
        self.orders.get(&id).map(|o| o.broker)
    }

    #[must_use]
    pub fn order_confirmer(&self, id: OrderId) -> Option<Address> {
        self.orders.get(&id).and_then(|o| o.confirmer)
    }

    /// Block the order was opened at, `0` for unknown orders.
    #[must_use]
    pub fn order_block_number(&self, id: OrderId) -> BlockNumber {
        self.orders.get(&id).map_or(0, |o| o.block_number)
    }

    /// Blocks elapsed between opening and `current_block`.
    #[must_use]
    pub fn order_depth(&self, id: OrderId, current_block: BlockNumber) -> u64 {
        self.orders
            .get(&id)
            .map_or(0, |o| current_block.saturating_sub(o.block_number))
    }

    /// 1-based opening sequence, `0` for unknown orders.
    #[must_use]
    pub fn order_priority(&self, id: OrderId) -> u64 {
        self.orders.get(&id).map_or(0, |o| o.priority)
    }

    #[must_use]
    pub fn orders_count(&self) -> usize {
        self.all_orders.len()
    }

    #[must_use]
    pub fn buy_orders(&self, offset: usize, limit: usize) -> Vec<OrderId> {
        page(&self.buy_orders, offset, limit).to_vec()
    }

    #[must_use]
    pub fn sell_orders(&self, offset: usize, limit: usize) -> Vec<OrderId> {
        page(&self.sell_orders, offset, limit).to_vec()
    }

    /// A page of all orders with their traders, confirmers and state codes.
    #[must_use]
    pub fn get_orders(&self, offset: usize, limit: usize) -> OrderPage {
        let ids = page(&self.all_orders, offset, limit);
        let mut out = OrderPage {
            ids: Vec::with_capacity(ids.len()),
            traders: Vec::with_capacity(ids.len()),
            confirmers: Vec::with_capacity(ids.len()),
            states: Vec::with_capacity(ids.len()),
        };
        for id in ids {
            if let Some(order) = self.orders.get(id) {
                out.ids.push(*id);
                out.traders.push(order.trader);
                out.confirmers.push(order.confirmer);
                out.states.push(order.state.code());
            }
        }
        out
    }
}

/// Slice `items[offset..offset + limit]`, clamped. A `limit` of zero means
/// [`MAX_PAGE_SIZE`].
fn page(items: &[OrderId], offset: usize, limit: usize) -> &[OrderId] {
    let limit = if limit == 0 {
        MAX_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };
    let start = offset.min(items.len());
    let end = start.saturating_add(limit).min(items.len());
    &items[start..end]
}
