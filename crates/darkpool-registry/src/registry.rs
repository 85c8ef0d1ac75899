//! The darknode registry.
//!
//! Holds every darknode record, the current and previous epochs, and the
//! registry policy (minimum bond, pod size, epoch interval, slasher). Bonds
//! are escrowed at the registry's own address through the [`Erc20`]
//! capability.
//!
//! ## Epoch markers
//!
//! `register` and `deregister` never change the current cohort. They set
//! `registered_at` / `deregistered_at` to `current.blocknumber +
//! minimum_epoch_interval`, which the next epoch is guaranteed to reach.
//!
//! ## Custody ordering
//!
//! Records are written before bond tokens move. If a transfer fails the
//! record change is undone, so a failed call leaves the registry unchanged.

use std::collections::HashMap;

use darkpool_types::constants::MAX_PAGE_SIZE;
use darkpool_types::{
    Address, Amount, CallContext, DarkpoolError, Erc20, Event, EventLog, Ownable,
    RegistryConfig, Result, checked_add,
};

use crate::darknode::{Darknode, DarknodeStatus, Epoch};
use crate::pod::assign_pods;

/// Registry of bonded darknodes and epoch policy.
#[derive(Debug, Clone)]
pub struct DarknodeRegistry {
    address: Address,
    bond_token: Address,
    ownable: Ownable,
    darknodes: HashMap<Address, Darknode>,
    /// Registration order; drives pagination.
    index: Vec<Address>,
    current_epoch: Epoch,
    previous_epoch: Epoch,

    minimum_bond: Amount,
    minimum_pod_size: u64,
    minimum_epoch_interval: u64,
    slasher: Option<Address>,

    next_minimum_bond: Amount,
    next_minimum_pod_size: u64,
    next_minimum_epoch_interval: u64,
    next_slasher: Option<Address>,

    /// Slashing penalties not paid out to challengers.
    forfeited: Amount,
    events: EventLog,
}

impl DarknodeRegistry {
    /// Create a registry at `address`, cutting the genesis epoch at
    /// `genesis_block`.
    #[must_use]
    pub fn new(
        address: Address,
        owner: Address,
        config: &RegistryConfig,
        genesis_block: u64,
    ) -> Self {
        Self {
            address,
            bond_token: config.bond_token,
            ownable: Ownable::new(owner),
            darknodes: HashMap::new(),
            index: Vec::new(),
            current_epoch: Epoch::genesis(genesis_block),
            previous_epoch: Epoch::default(),
            minimum_bond: config.minimum_bond,
            minimum_pod_size: config.minimum_pod_size,
            minimum_epoch_interval: config.minimum_epoch_interval,
            slasher: config.slasher,
            next_minimum_bond: config.minimum_bond,
            next_minimum_pod_size: config.minimum_pod_size,
            next_minimum_epoch_interval: config.minimum_epoch_interval,
            next_slasher: config.slasher,
            forfeited: Amount::zero(),
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn bond_token(&self) -> Address {
        self.bond_token
    }

    #[must_use]
    pub fn owner(&self) -> Option<Address> {
        self.ownable.owner()
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<()> {
        self.ownable
            .transfer_ownership(ctx, new_owner, &mut self.events)
    }

    pub fn renounce_ownership(&mut self, ctx: &CallContext) -> Result<()> {
        self.ownable.renounce_ownership(ctx, &mut self.events)
    }

    // =================================================================
    // Darknode lifecycle
    // =================================================================

    /// Register `node` owned by the caller, escrowing `bond` of the bond
    /// token. The caller must have approved the registry as spender.
    ///
    /// The node joins the cohort at the next epoch.
    pub fn register(
        &mut self,
        ctx: &CallContext,
        erc20: &mut dyn Erc20,
        node: Address,
        public_key: Vec<u8>,
        bond: Amount,
    ) -> Result<()> {
        if bond < self.minimum_bond {
            return Err(DarkpoolError::BondTooLow {
                bond,
                minimum: self.minimum_bond,
            });
        }
        if node.is_zero() {
            return Err(DarkpoolError::InvalidDarknodeId(node));
        }
        if self.darknodes.contains_key(&node) {
            return Err(DarkpoolError::DarknodeAlreadyRegistered(node));
        }

        let registered_at = self.next_epoch_block();
        self.darknodes.insert(
            node,
            Darknode {
                id: node,
                owner: ctx.sender,
                bond,
                public_key,
                registered_at,
                deregistered_at: 0,
            },
        );
        self.index.push(node);

        let escrowed =
            erc20.transfer_from(self.bond_token, self.address, ctx.sender, self.address, bond);
        if let Err(e) = escrowed {
            self.darknodes.remove(&node);
            self.index.pop();
            return Err(e);
        }

        tracing::info!(
            node = %node,
            owner = %ctx.sender,
            bond = %bond,
            registered_at,
            "Darknode registered"
        );
        self.events.emit(Event::DarknodeRegistered { node, bond });
        Ok(())
    }

    /// Mark `node` for removal at the next epoch. Owner only; the node must
    /// be in the current cohort and not already deregistering.
    pub fn deregister(&mut self, ctx: &CallContext, node: Address) -> Result<()> {
        self.require_darknode_owner(ctx, node)?;
        if !self.is_deregisterable(node) {
            return Err(DarkpoolError::NotDeregisterable(node));
        }

        let deregistered_at = self.next_epoch_block();
        if let Some(record) = self.darknodes.get_mut(&node) {
            record.deregistered_at = deregistered_at;
        }

        tracing::info!(node = %node, deregistered_at, "Darknode deregistered");
        self.events.emit(Event::DarknodeDeregistered { node });
        Ok(())
    }

    /// Return the bond of a deregistered node to its owner and forget the
    /// node. Owner only; the node must have been out of the cohort for a
    /// full epoch.
    pub fn refund(
        &mut self,
        ctx: &CallContext,
        erc20: &mut dyn Erc20,
        node: Address,
    ) -> Result<()> {
        self.require_darknode_owner(ctx, node)?;
        if !self.is_refundable(node) {
            return Err(DarkpoolError::NotRefundable(node));
        }

        let (position, record) = self.remove_darknode(node)?;
        if let Err(e) = erc20.transfer(self.bond_token, self.address, record.owner, record.bond) {
            self.restore_darknode(position, record);
            return Err(e);
        }

        tracing::info!(node = %node, owner = %record.owner, bond = %record.bond, "Darknode refunded");
        self.events.emit(Event::DarknodeOwnerRefunded {
            owner: record.owner,
            amount: record.bond,
        });
        Ok(())
    }

    /// Cut a new epoch. Anyone may call once `minimum_epoch_interval`
    /// blocks have passed since the current epoch.
    ///
    /// Pending registrations and deregistrations take effect, and staged
    /// policy changes are committed.
    pub fn epoch(&mut self, ctx: &CallContext) -> Result<()> {
        let next_block = self.next_epoch_block();
        if ctx.block_number < next_block {
            return Err(DarkpoolError::EpochIntervalNotElapsed { next_block });
        }

        let epoch = self.current_epoch.next(ctx.block_number);
        self.previous_epoch = self.current_epoch;
        self.current_epoch = epoch;

        tracing::info!(
            block = epoch.blocknumber,
            epochhash = %hex::encode(epoch.epochhash),
            cohort = self.num_darknodes(),
            "New epoch"
        );
        self.events.emit(Event::NewEpoch {
            epochhash: epoch.epochhash,
            block_number: epoch.blocknumber,
        });

        self.commit_staged_policy();
        Ok(())
    }

    /// Penalize `prover` for a bad confirmation, rewarding the owners of
    /// `challenger1` and `challenger2`. Slasher only.
    ///
    /// Half the bond is the penalty; each challenger's owner receives a
    /// quarter of the penalty and the rest is forfeited. The other half of
    /// the bond goes back to the prover's owner and the prover is removed
    /// immediately.
    pub fn slash(
        &mut self,
        ctx: &CallContext,
        erc20: &mut dyn Erc20,
        prover: Address,
        challenger1: Address,
        challenger2: Address,
    ) -> Result<()> {
        if self.slasher != Some(ctx.sender) {
            tracing::warn!(caller = %ctx.sender, prover = %prover, "Unauthorized slash rejected");
            return Err(DarkpoolError::NotSlasher { caller: ctx.sender });
        }
        if !(self.is_registered(prover) || self.is_registered_in_previous_epoch(prover)) {
            return Err(DarkpoolError::NotRegisteredDarknode(prover));
        }
        if challenger1 == challenger2 || challenger1 == prover || challenger2 == prover {
            return Err(DarkpoolError::InvalidChallengers {
                prover,
                challenger1,
                challenger2,
            });
        }
        let owner1 = self
            .darknode_owner(challenger1)
            .ok_or(DarkpoolError::DarknodeNotFound(challenger1))?;
        let owner2 = self
            .darknode_owner(challenger2)
            .ok_or(DarkpoolError::DarknodeNotFound(challenger2))?;

        let bond = self.darknode_bond(prover);
        let penalty = bond / 2;
        let reward = penalty / 4;
        let returned = bond - penalty;
        let forfeited = penalty - reward * 2;

        let escrow = erc20.balance_of(self.bond_token, self.address);
        if escrow < bond {
            return Err(DarkpoolError::InsufficientBalance {
                needed: bond,
                available: escrow,
            });
        }

        let (position, record) = self.remove_darknode(prover)?;
        let previous_forfeited = self.forfeited;
        self.forfeited = checked_add(self.forfeited, forfeited)?;

        let payouts = [(owner1, reward), (owner2, reward), (record.owner, returned)];
        for (paid, (recipient, value)) in payouts.iter().enumerate() {
            if let Err(e) = erc20.transfer(self.bond_token, self.address, *recipient, *value) {
                self.claw_back(erc20, &payouts[..paid]);
                self.forfeited = previous_forfeited;
                self.restore_darknode(position, record);
                return Err(e);
            }
        }

        tracing::info!(
            prover = %prover,
            penalty = %penalty,
            reward = %reward,
            challenger1 = %challenger1,
            challenger2 = %challenger2,
            "Darknode slashed"
        );
        self.events.emit(Event::DarknodeSlashed {
            prover,
            penalty,
            reward,
        });
        Ok(())
    }

    // =================================================================
    // Staged policy (owner only, effective next epoch)
    // =================================================================

    pub fn update_minimum_bond(&mut self, ctx: &CallContext, next: Amount) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.next_minimum_bond = next;
        Ok(())
    }

    pub fn update_minimum_pod_size(&mut self, ctx: &CallContext, next: u64) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        if next == 0 {
            return Err(DarkpoolError::Configuration(
                "minimum pod size must be > 0".into(),
            ));
        }
        self.next_minimum_pod_size = next;
        Ok(())
    }

    pub fn update_minimum_epoch_interval(&mut self, ctx: &CallContext, next: u64) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        if next == 0 {
            return Err(DarkpoolError::Configuration(
                "minimum epoch interval must be > 0".into(),
            ));
        }
        self.next_minimum_epoch_interval = next;
        Ok(())
    }

    pub fn update_slasher(&mut self, ctx: &CallContext, next: Option<Address>) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.next_slasher = next;
        Ok(())
    }

    fn commit_staged_policy(&mut self) {
        if self.next_minimum_bond != self.minimum_bond {
            self.events.emit(Event::MinimumBondUpdated {
                previous: self.minimum_bond,
                next: self.next_minimum_bond,
            });
            self.minimum_bond = self.next_minimum_bond;
        }
        if self.next_minimum_pod_size != self.minimum_pod_size {
            self.events.emit(Event::MinimumPodSizeUpdated {
                previous: self.minimum_pod_size,
                next: self.next_minimum_pod_size,
            });
            self.minimum_pod_size = self.next_minimum_pod_size;
        }
        if self.next_minimum_epoch_interval != self.minimum_epoch_interval {
            self.events.emit(Event::MinimumEpochIntervalUpdated {
                previous: self.minimum_epoch_interval,
                next: self.next_minimum_epoch_interval,
            });
            self.minimum_epoch_interval = self.next_minimum_epoch_interval;
        }
        if self.next_slasher != self.slasher {
            self.events.emit(Event::SlasherUpdated {
                previous: self.slasher,
                next: self.next_slasher,
            });
            self.slasher = self.next_slasher;
        }
    }

    // =================================================================
    // Status queries
    // =================================================================

    /// In the current epoch's cohort.
    #[must_use]
    pub fn is_registered(&self, node: Address) -> bool {
        self.is_registered_in(node, &self.current_epoch)
    }

    /// In the previous epoch's cohort.
    #[must_use]
    pub fn is_registered_in_previous_epoch(&self, node: Address) -> bool {
        self.is_registered_in(node, &self.previous_epoch)
    }

    #[must_use]
    pub fn is_pending_registration(&self, node: Address) -> bool {
        self.darknodes
            .get(&node)
            .is_some_and(|n| n.registered_at > self.current_epoch.blocknumber)
    }

    #[must_use]
    pub fn is_pending_deregistration(&self, node: Address) -> bool {
        self.darknodes.get(&node).is_some_and(|n| {
            n.deregistered_at != 0 && n.deregistered_at > self.current_epoch.blocknumber
        })
    }

    #[must_use]
    pub fn is_deregisterable(&self, node: Address) -> bool {
        self.is_registered(node)
            && self
                .darknodes
                .get(&node)
                .is_some_and(|n| n.deregistered_at == 0)
    }

    #[must_use]
    pub fn is_deregistered(&self, node: Address) -> bool {
        self.darknodes.get(&node).is_some_and(|n| {
            n.deregistered_at != 0 && n.deregistered_at <= self.current_epoch.blocknumber
        })
    }

    /// Deregistered for at least one full epoch.
    #[must_use]
    pub fn is_refundable(&self, node: Address) -> bool {
        self.is_deregistered(node)
            && self
                .darknodes
                .get(&node)
                .is_some_and(|n| n.deregistered_at <= self.previous_epoch.blocknumber)
    }

    /// No record: never registered, already refunded, or slashed out.
    #[must_use]
    pub fn is_refunded(&self, node: Address) -> bool {
        !self.darknodes.contains_key(&node)
    }

    /// The node's lifecycle state.
    #[must_use]
    pub fn status(&self, node: Address) -> DarknodeStatus {
        if self.is_refunded(node) {
            DarknodeStatus::Unregistered
        } else if self.is_pending_registration(node) {
            DarknodeStatus::PendingRegistration
        } else if self.is_pending_deregistration(node) {
            DarknodeStatus::PendingDeregistration
        } else if self.is_refundable(node) {
            DarknodeStatus::Refundable
        } else if self.is_deregistered(node) {
            DarknodeStatus::Deregistered
        } else {
            DarknodeStatus::Registered
        }
    }

    fn is_registered_in(&self, node: Address, epoch: &Epoch) -> bool {
        self.darknodes
            .get(&node)
            .is_some_and(|n| n.is_registered_in(epoch))
    }

    // =================================================================
    // Record queries
    // =================================================================

    #[must_use]
    pub fn darknode(&self, node: Address) -> Option<&Darknode> {
        self.darknodes.get(&node)
    }

    #[must_use]
    pub fn darknode_owner(&self, node: Address) -> Option<Address> {
        self.darknodes.get(&node).map(|n| n.owner)
    }

    /// Escrowed bond, zero for unknown nodes.
    #[must_use]
    pub fn darknode_bond(&self, node: Address) -> Amount {
        self.darknodes
            .get(&node)
            .map_or_else(Amount::zero, |n| n.bond)
    }

    #[must_use]
    pub fn darknode_public_key(&self, node: Address) -> Option<&[u8]> {
        self.darknodes.get(&node).map(|n| n.public_key.as_slice())
    }

    /// Size of the current cohort.
    #[must_use]
    pub fn num_darknodes(&self) -> usize {
        self.count_in(&self.current_epoch)
    }

    /// Size of the cohort the next epoch will have.
    #[must_use]
    pub fn num_darknodes_next_epoch(&self) -> usize {
        let next = Epoch {
            epochhash: [0u8; 32],
            blocknumber: self.next_epoch_block(),
        };
        self.count_in(&next)
    }

    #[must_use]
    pub fn num_darknodes_previous_epoch(&self) -> usize {
        self.count_in(&self.previous_epoch)
    }

    /// Page through the current cohort in registration order. A `limit`
    /// of zero returns up to [`MAX_PAGE_SIZE`] entries.
    #[must_use]
    pub fn get_darknodes(&self, offset: usize, limit: usize) -> Vec<Address> {
        self.page(&self.current_epoch, offset, limit)
    }

    /// Page through the previous epoch's cohort in registration order.
    #[must_use]
    pub fn get_previous_darknodes(&self, offset: usize, limit: usize) -> Vec<Address> {
        self.page(&self.previous_epoch, offset, limit)
    }

    fn count_in(&self, epoch: &Epoch) -> usize {
        self.darknodes
            .values()
            .filter(|n| n.is_registered_in(epoch))
            .count()
    }

    fn page(&self, epoch: &Epoch, offset: usize, limit: usize) -> Vec<Address> {
        let limit = if limit == 0 {
            MAX_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        };
        self.index
            .iter()
            .filter(|id| {
                self.darknodes
                    .get(id)
                    .is_some_and(|n| n.is_registered_in(epoch))
            })
            .skip(offset)
            .take(limit)
            .copied()
            .collect()
    }

    // =================================================================
    // Pods
    // =================================================================

    /// Pods of the current epoch.
    #[must_use]
    pub fn pods(&self) -> Vec<Vec<Address>> {
        let cohort: Vec<Address> = self
            .index
            .iter()
            .filter(|id| self.is_registered(**id))
            .copied()
            .collect();
        let pod_size = usize::try_from(self.minimum_pod_size).unwrap_or(usize::MAX);
        assign_pods(&self.current_epoch.epochhash, &cohort, pod_size)
    }

    /// The current-epoch pod containing `node`, if any.
    #[must_use]
    pub fn pod_of(&self, node: Address) -> Option<Vec<Address>> {
        if !self.is_registered(node) {
            return None;
        }
        self.pods().into_iter().find(|pod| pod.contains(&node))
    }

    // =================================================================
    // Epochs and policy
    // =================================================================

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        self.current_epoch
    }

    #[must_use]
    pub fn previous_epoch(&self) -> Epoch {
        self.previous_epoch
    }

    /// First block at which `epoch()` succeeds.
    #[must_use]
    pub fn next_epoch_block(&self) -> u64 {
        self.current_epoch
            .blocknumber
            .saturating_add(self.minimum_epoch_interval)
    }

    #[must_use]
    pub fn minimum_bond(&self) -> Amount {
        self.minimum_bond
    }

    #[must_use]
    pub fn minimum_pod_size(&self) -> u64 {
        self.minimum_pod_size
    }

    #[must_use]
    pub fn minimum_epoch_interval(&self) -> u64 {
        self.minimum_epoch_interval
    }

    #[must_use]
    pub fn slasher(&self) -> Option<Address> {
        self.slasher
    }

    #[must_use]
    pub fn next_minimum_bond(&self) -> Amount {
        self.next_minimum_bond
    }

    #[must_use]
    pub fn next_minimum_pod_size(&self) -> u64 {
        self.next_minimum_pod_size
    }

    #[must_use]
    pub fn next_minimum_epoch_interval(&self) -> u64 {
        self.next_minimum_epoch_interval
    }

    #[must_use]
    pub fn next_slasher(&self) -> Option<Address> {
        self.next_slasher
    }

    /// Total slashing penalty retained by the registry.
    #[must_use]
    pub fn forfeited_bonds(&self) -> Amount {
        self.forfeited
    }

    // =================================================================
    // Internals
    // =================================================================

    fn require_darknode_owner(&self, ctx: &CallContext, node: Address) -> Result<()> {
        let owner = self
            .darknode_owner(node)
            .ok_or(DarkpoolError::DarknodeNotFound(node))?;
        if owner != ctx.sender {
            return Err(DarkpoolError::NotDarknodeOwner {
                caller: ctx.sender,
                node,
            });
        }
        Ok(())
    }

    fn remove_darknode(&mut self, node: Address) -> Result<(usize, Darknode)> {
        let position = self
            .index
            .iter()
            .position(|id| *id == node)
            .ok_or(DarkpoolError::DarknodeNotFound(node))?;
        let record = self
            .darknodes
            .remove(&node)
            .ok_or(DarkpoolError::DarknodeNotFound(node))?;
        self.index.remove(position);
        Ok((position, record))
    }

    fn restore_darknode(&mut self, position: usize, record: Darknode) {
        self.index.insert(position, record.id);
        self.darknodes.insert(record.id, record);
    }

    /// Return slash payouts to escrow, latest first.
    fn claw_back(&self, erc20: &mut dyn Erc20, paid: &[(Address, Amount)]) {
        for (recipient, value) in paid.iter().rev() {
            if let Err(e) = erc20.transfer(self.bond_token, *recipient, self.address, *value) {
                tracing::error!(
                    recipient = %recipient,
                    value = %value,
                    error = %e,
                    "Slash payout clawback failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkpool_types::InMemoryErc20;

    const INTERVAL: u64 = 10;
    const BOND: u64 = 1_000;

    fn addr(s: &str) -> Address {
        Address::derived(s)
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            bond_token: addr("ren"),
            minimum_bond: Amount::from(BOND),
            minimum_pod_size: 2,
            minimum_epoch_interval: INTERVAL,
            slasher: Some(addr("slasher")),
        }
    }

    fn setup() -> (DarknodeRegistry, InMemoryErc20) {
        let registry = DarknodeRegistry::new(addr("registry"), addr("owner"), &config(), 100);
        (registry, InMemoryErc20::new())
    }

    fn ctx(who: &str, block: u64) -> CallContext {
        CallContext::new(addr(who), block)
    }

    fn fund(bank: &mut InMemoryErc20, owner: &str, value: u64) {
        bank.mint(addr("ren"), addr(owner), Amount::from(value));
        bank.approve(addr("ren"), addr(owner), addr("registry"), Amount::from(value));
    }

    fn register(
        reg: &mut DarknodeRegistry,
        bank: &mut InMemoryErc20,
        owner: &str,
        node: &str,
        block: u64,
    ) {
        fund(bank, owner, BOND);
        reg.register(&ctx(owner, block), bank, addr(node), vec![1], Amount::from(BOND))
            .unwrap();
    }

    /// Cut the next epoch at the earliest block allowed.
    fn next_epoch(reg: &mut DarknodeRegistry) -> u64 {
        let block = reg.next_epoch_block();
        reg.epoch(&ctx("anyone", block)).unwrap();
        block
    }

    #[test]
    fn registration_takes_effect_next_epoch() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "node-a", 101);

        assert!(reg.is_pending_registration(addr("node-a")));
        assert!(!reg.is_registered(addr("node-a")));
        assert_eq!(reg.status(addr("node-a")), DarknodeStatus::PendingRegistration);
        assert_eq!(reg.num_darknodes(), 0);
        assert_eq!(reg.num_darknodes_next_epoch(), 1);
        assert_eq!(bank.balance_of(addr("ren"), addr("registry")), Amount::from(BOND));

        next_epoch(&mut reg);
        assert!(reg.is_registered(addr("node-a")));
        assert!(!reg.is_pending_registration(addr("node-a")));
        assert_eq!(reg.status(addr("node-a")), DarknodeStatus::Registered);
        assert_eq!(reg.darknode_owner(addr("node-a")), Some(addr("alice")));
        assert_eq!(reg.darknode_public_key(addr("node-a")), Some(&[1u8][..]));
    }

    #[test]
    fn register_rejects_low_bond_and_duplicates() {
        let (mut reg, mut bank) = setup();
        fund(&mut bank, "alice", BOND * 2);
        let err = reg
            .register(&ctx("alice", 101), &mut bank, addr("n"), vec![], Amount::from(BOND - 1))
            .unwrap_err();
        assert!(matches!(err, DarkpoolError::BondTooLow { .. }));

        reg.register(&ctx("alice", 101), &mut bank, addr("n"), vec![], Amount::from(BOND))
            .unwrap();
        let err = reg
            .register(&ctx("alice", 101), &mut bank, addr("n"), vec![], Amount::from(BOND))
            .unwrap_err();
        assert_eq!(err, DarkpoolError::DarknodeAlreadyRegistered(addr("n")));

        let err = reg
            .register(&ctx("alice", 101), &mut bank, Address::ZERO, vec![], Amount::from(BOND))
            .unwrap_err();
        assert_eq!(err, DarkpoolError::InvalidDarknodeId(Address::ZERO));
    }

    #[test]
    fn failed_bond_transfer_leaves_no_record() {
        let (mut reg, mut bank) = setup();
        let events_before = reg.events().len();
        // No allowance granted.
        bank.mint(addr("ren"), addr("alice"), Amount::from(BOND));
        let err = reg
            .register(&ctx("alice", 101), &mut bank, addr("n"), vec![], Amount::from(BOND))
            .unwrap_err();
        assert!(matches!(err, DarkpoolError::TransferFailed { .. }));
        assert!(reg.is_refunded(addr("n")));
        assert_eq!(reg.num_darknodes_next_epoch(), 0);
        assert_eq!(reg.events().len(), events_before);
    }

    #[test]
    fn epoch_requires_interval() {
        let (mut reg, _) = setup();
        let err = reg.epoch(&ctx("anyone", 100 + INTERVAL - 1)).unwrap_err();
        assert_eq!(
            err,
            DarkpoolError::EpochIntervalNotElapsed {
                next_block: 100 + INTERVAL
            }
        );

        let block = next_epoch(&mut reg);
        assert_eq!(reg.current_epoch().blocknumber, block);
        assert_eq!(reg.previous_epoch().blocknumber, 100);
        // A second call in the same window fails.
        assert!(reg.epoch(&ctx("anyone", block + 1)).is_err());
    }

    #[test]
    fn full_lifecycle_to_refund() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "node-a", 101);
        next_epoch(&mut reg);

        // Only the owner may deregister.
        let block = reg.current_epoch().blocknumber;
        assert!(matches!(
            reg.deregister(&ctx("mallory", block), addr("node-a")),
            Err(DarkpoolError::NotDarknodeOwner { .. })
        ));
        reg.deregister(&ctx("alice", block), addr("node-a")).unwrap();
        assert!(reg.is_pending_deregistration(addr("node-a")));
        assert!(reg.is_registered(addr("node-a")));
        assert_eq!(
            reg.deregister(&ctx("alice", block), addr("node-a")).unwrap_err(),
            DarkpoolError::NotDeregisterable(addr("node-a"))
        );

        next_epoch(&mut reg);
        assert!(reg.is_deregistered(addr("node-a")));
        assert!(!reg.is_registered(addr("node-a")));
        assert!(reg.is_registered_in_previous_epoch(addr("node-a")));
        assert_eq!(reg.status(addr("node-a")), DarknodeStatus::Deregistered);
        assert_eq!(
            reg.refund(&ctx("alice", block), &mut bank, addr("node-a")).unwrap_err(),
            DarkpoolError::NotRefundable(addr("node-a"))
        );

        next_epoch(&mut reg);
        assert!(reg.is_refundable(addr("node-a")));
        reg.refund(&ctx("alice", block), &mut bank, addr("node-a")).unwrap();
        assert!(reg.is_refunded(addr("node-a")));
        assert_eq!(reg.status(addr("node-a")), DarknodeStatus::Unregistered);
        assert_eq!(bank.balance_of(addr("ren"), addr("alice")), Amount::from(BOND));
        assert_eq!(
            reg.events().last(),
            Some(&Event::DarknodeOwnerRefunded {
                owner: addr("alice"),
                amount: Amount::from(BOND)
            })
        );
    }

    #[test]
    fn pending_node_cannot_deregister() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "node-a", 101);
        assert_eq!(
            reg.deregister(&ctx("alice", 101), addr("node-a")).unwrap_err(),
            DarkpoolError::NotDeregisterable(addr("node-a"))
        );
    }

    #[test]
    fn staged_policy_commits_at_epoch() {
        let (mut reg, _) = setup();
        let owner = ctx("owner", 101);
        reg.update_minimum_bond(&owner, Amount::from(5u64)).unwrap();
        reg.update_minimum_pod_size(&owner, 3).unwrap();
        reg.update_minimum_epoch_interval(&owner, 20).unwrap();
        reg.update_slasher(&owner, Some(addr("new-slasher"))).unwrap();
        assert!(reg.update_minimum_bond(&ctx("mallory", 101), Amount::one()).is_err());
        assert!(reg.update_minimum_pod_size(&owner, 0).is_err());

        assert_eq!(reg.minimum_bond(), Amount::from(BOND));
        assert_eq!(reg.next_minimum_bond(), Amount::from(5u64));
        assert_eq!(reg.next_minimum_pod_size(), 3);
        assert_eq!(reg.next_minimum_epoch_interval(), 20);
        assert_eq!(reg.next_slasher(), Some(addr("new-slasher")));

        let cursor = reg.events().len();
        next_epoch(&mut reg);
        assert_eq!(reg.minimum_bond(), Amount::from(5u64));
        assert_eq!(reg.minimum_pod_size(), 3);
        assert_eq!(reg.minimum_epoch_interval(), 20);
        assert_eq!(reg.slasher(), Some(addr("new-slasher")));

        let names: Vec<&str> = reg.events().since(cursor).iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec![
                "LogNewEpoch",
                "LogMinimumBondUpdated",
                "LogMinimumPodSizeUpdated",
                "LogMinimumEpochIntervalUpdated",
                "LogSlasherUpdated"
            ]
        );
    }

    #[test]
    fn pagination_follows_registration_order() {
        let (mut reg, mut bank) = setup();
        for i in 0..5 {
            register(&mut reg, &mut bank, &format!("owner-{i}"), &format!("node-{i}"), 101);
        }
        next_epoch(&mut reg);

        let all = reg.get_darknodes(0, 0);
        let expected: Vec<Address> = (0..5).map(|i| addr(&format!("node-{i}"))).collect();
        assert_eq!(all, expected);
        assert_eq!(reg.get_darknodes(1, 2), expected[1..3].to_vec());
        assert!(reg.get_darknodes(10, 2).is_empty());
        assert!(reg.get_previous_darknodes(0, 0).is_empty());

        next_epoch(&mut reg);
        assert_eq!(reg.get_previous_darknodes(0, 0), expected);
        assert_eq!(reg.num_darknodes_previous_epoch(), 5);
    }

    #[test]
    fn pods_cover_cohort() {
        let (mut reg, mut bank) = setup();
        for i in 0..5 {
            register(&mut reg, &mut bank, &format!("owner-{i}"), &format!("node-{i}"), 101);
        }
        assert!(reg.pods().is_empty());
        next_epoch(&mut reg);

        let pods = reg.pods();
        assert_eq!(pods.len(), 2);
        let pod = reg.pod_of(addr("node-0")).unwrap();
        assert!(pod.contains(&addr("node-0")));
        assert!(pod.len() >= 2);
        assert!(reg.pod_of(addr("stranger")).is_none());
    }

    #[test]
    fn slash_splits_bond() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "prover", 101);
        register(&mut reg, &mut bank, "bob", "c1", 101);
        register(&mut reg, &mut bank, "carol", "c2", 101);
        next_epoch(&mut reg);

        let block = reg.current_epoch().blocknumber;
        assert!(matches!(
            reg.slash(&ctx("mallory", block), &mut bank, addr("prover"), addr("c1"), addr("c2")),
            Err(DarkpoolError::NotSlasher { .. })
        ));
        assert_eq!(
            reg.slash(&ctx("slasher", block), &mut bank, addr("prover"), addr("c1"), addr("c1"))
                .unwrap_err(),
            DarkpoolError::InvalidChallengers {
                prover: addr("prover"),
                challenger1: addr("c1"),
                challenger2: addr("c1"),
            }
        );

        reg.slash(&ctx("slasher", block), &mut bank, addr("prover"), addr("c1"), addr("c2"))
            .unwrap();

        // bond 1000: penalty 500, reward 125 each, 250 forfeited, 500 back.
        let ren = addr("ren");
        assert_eq!(bank.balance_of(ren, addr("bob")), Amount::from(125u64));
        assert_eq!(bank.balance_of(ren, addr("carol")), Amount::from(125u64));
        assert_eq!(bank.balance_of(ren, addr("alice")), Amount::from(500u64));
        assert_eq!(reg.forfeited_bonds(), Amount::from(250u64));
        assert_eq!(
            bank.balance_of(ren, addr("registry")),
            Amount::from(2 * BOND + 250)
        );
        assert!(reg.is_refunded(addr("prover")));
        assert!(!reg.is_registered(addr("prover")));
        assert_eq!(reg.num_darknodes(), 2);
        assert_eq!(
            reg.events().last(),
            Some(&Event::DarknodeSlashed {
                prover: addr("prover"),
                penalty: Amount::from(500u64),
                reward: Amount::from(125u64)
            })
        );
    }

    /// Rejects every transfer paying `blocked`.
    struct Blacklist {
        inner: InMemoryErc20,
        blocked: Address,
    }

    impl Erc20 for Blacklist {
        fn balance_of(&self, token: Address, owner: Address) -> Amount {
            self.inner.balance_of(token, owner)
        }

        fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
            self.inner.allowance(token, owner, spender)
        }

        fn approve(&mut self, token: Address, owner: Address, spender: Address, value: Amount) {
            self.inner.approve(token, owner, spender, value);
        }

        fn transfer(
            &mut self,
            token: Address,
            from: Address,
            to: Address,
            value: Amount,
        ) -> Result<()> {
            if to == self.blocked {
                return Err(DarkpoolError::TransferFailed {
                    reason: "blacklisted".into(),
                });
            }
            self.inner.transfer(token, from, to, value)
        }

        fn transfer_from(
            &mut self,
            token: Address,
            spender: Address,
            from: Address,
            to: Address,
            value: Amount,
        ) -> Result<()> {
            if to == self.blocked {
                return Err(DarkpoolError::TransferFailed {
                    reason: "blacklisted".into(),
                });
            }
            self.inner.transfer_from(token, spender, from, to, value)
        }
    }

    #[test]
    fn failed_slash_payout_returns_earlier_payouts() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "prover", 101);
        register(&mut reg, &mut bank, "bob", "c1", 101);
        register(&mut reg, &mut bank, "carol", "c2", 101);
        next_epoch(&mut reg);
        let events = reg.events().len();

        // Carol's payout is second; Bob's has already gone out when it fails.
        let mut bank = Blacklist {
            inner: bank,
            blocked: addr("carol"),
        };
        let block = reg.current_epoch().blocknumber;
        let err = reg
            .slash(&ctx("slasher", block), &mut bank, addr("prover"), addr("c1"), addr("c2"))
            .unwrap_err();
        assert!(matches!(err, DarkpoolError::TransferFailed { .. }));

        let ren = addr("ren");
        assert_eq!(bank.balance_of(ren, addr("registry")), Amount::from(3 * BOND));
        assert!(bank.balance_of(ren, addr("bob")).is_zero());
        assert!(bank.balance_of(ren, addr("alice")).is_zero());
        assert!(reg.is_registered(addr("prover")));
        assert_eq!(reg.darknode_bond(addr("prover")), Amount::from(BOND));
        assert!(reg.forfeited_bonds().is_zero());
        assert_eq!(reg.index, vec![addr("prover"), addr("c1"), addr("c2")]);
        assert_eq!(reg.events().len(), events);

        bank.blocked = Address::ZERO;
        reg.slash(&ctx("slasher", block), &mut bank, addr("prover"), addr("c1"), addr("c2"))
            .unwrap();
        assert_eq!(bank.balance_of(ren, addr("bob")), Amount::from(125u64));
        assert_eq!(bank.balance_of(ren, addr("carol")), Amount::from(125u64));
        assert_eq!(
            bank.balance_of(ren, addr("registry")),
            Amount::from(2 * BOND + 250)
        );
    }

    #[test]
    fn slash_requires_registered_prover() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "prover", 101);
        register(&mut reg, &mut bank, "bob", "c1", 101);
        register(&mut reg, &mut bank, "carol", "c2", 101);
        // Still pending registration.
        let err = reg
            .slash(&ctx("slasher", 101), &mut bank, addr("prover"), addr("c1"), addr("c2"))
            .unwrap_err();
        assert_eq!(err, DarkpoolError::NotRegisteredDarknode(addr("prover")));
    }

    #[test]
    fn failed_refund_restores_record() {
        let (mut reg, mut bank) = setup();
        register(&mut reg, &mut bank, "alice", "a", 101);
        register(&mut reg, &mut bank, "bob", "b", 101);
        next_epoch(&mut reg);
        reg.deregister(&ctx("alice", 111), addr("a")).unwrap();
        next_epoch(&mut reg);
        next_epoch(&mut reg);

        bank.freeze_token(addr("ren"));
        assert!(reg.refund(&ctx("alice", 131), &mut bank, addr("a")).is_err());
        assert!(reg.is_refundable(addr("a")));
        assert_eq!(reg.darknode_bond(addr("a")), Amount::from(BOND));
        assert_eq!(reg.index, vec![addr("a"), addr("b")]);
    }
}
