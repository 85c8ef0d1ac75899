//! End-to-end integration tests across every component.
//!
//! These tests deploy a full darkpool from a JSON configuration and drive
//! it the way traders, brokers, darknodes and the slasher would:
//! deposit -> register + epoch -> open -> confirm -> submit -> settle,
//! plus slashing, reward withdrawal and both withdrawal paths. After each
//! scenario, ledger custody must still match the token balances it holds.

use darkpool_ledger::{BalanceLedger, SettlementLedger, SignedBrokerVerifier, TokenRegistry};
use darkpool_orderbook::Orderbook;
use darkpool_registry::DarknodeRegistry;
use darkpool_settlement::{Collaborators, RewardVault, SettlementEngine, SettlementStatus};
use darkpool_types::fixed_point::{price_from_decimal, volume_from_decimal};
use darkpool_types::telemetry::init_tracing;
use darkpool_types::*;
use rust_decimal::Decimal;

const ETH: TokenCode = TokenCode(1);
const DGX: TokenCode = TokenCode(256);
const REN: TokenCode = TokenCode(65_536);
const BOND: u64 = 1_000;
const OPENING_FEE: u64 = 1;

const CONFIG: &str = r#"{
    "registry": { "minimum_pod_size": 2, "minimum_epoch_interval": 10 },
    "ledger": { "signal_delay": 20 },
    "settlement": { "submission_gas_price_limit": 50 }
}"#;

fn addr(label: &str) -> Address {
    Address::derived(label)
}

fn dgx() -> Address {
    addr("dgx")
}

fn ren() -> Address {
    RegistryConfig::default().bond_token
}

/// `whole × 10^decimals` base units.
fn units(whole: u64, decimals: u32) -> Amount {
    Amount::from(whole) * pow10(decimals).expect("small exponent")
}

fn price(s: &str) -> u64 {
    price_from_decimal(s.parse::<Decimal>().expect("decimal")).expect("price fits")
}

fn volume(s: &str) -> u64 {
    volume_from_decimal(s.parse::<Decimal>().expect("decimal")).expect("volume fits")
}

/// Helper: a complete deployment plus the block clock.
struct Deployment {
    bank: InMemoryErc20,
    registry: DarknodeRegistry,
    book: Orderbook,
    tokens: TokenRegistry,
    ledger: BalanceLedger,
    brokers: SignedBrokerVerifier<Ed25519Verifier>,
    vault: RewardVault,
    engine: SettlementEngine,
    broker: TestSigner,
    block: u64,
    nonce: u64,
}

impl Deployment {
    fn new() -> Self {
        init_tracing(false);
        let mut config = DarkpoolConfig::from_json_str(CONFIG).expect("Config should parse");
        config.registry.minimum_bond = Amount::from(BOND);
        config.registry.slasher = Some(addr("settlement"));
        config.orderbook.order_opening_fee = Amount::from(OPENING_FEE);
        config.settlement.slasher = Some(addr("slasher"));
        let owner = CallContext::new(addr("owner"), 0);

        let mut tokens = TokenRegistry::new(addr("tokens"), addr("owner"));
        tokens
            .register_token(&owner, ETH, Address::ETHEREUM, 18)
            .expect("ETH registers");
        tokens
            .register_token(&owner, DGX, dgx(), 9)
            .expect("DGX registers");
        tokens
            .register_token(&owner, REN, ren(), 18)
            .expect("REN registers");

        let broker = TestSigner::from_seed(9);
        let mut brokers = SignedBrokerVerifier::new(
            addr("brokers"),
            addr("owner"),
            addr("ledger"),
            Ed25519Verifier,
        );
        brokers
            .register_broker(&owner, broker.address())
            .expect("Broker registers");

        let mut d = Self {
            bank: InMemoryErc20::new(),
            registry: DarknodeRegistry::new(addr("registry"), addr("owner"), &config.registry, 0),
            book: Orderbook::new(
                addr("orderbook"),
                addr("owner"),
                addr("registry"),
                &config.orderbook,
            ),
            tokens,
            ledger: BalanceLedger::new(
                addr("ledger"),
                addr("owner"),
                addr("settlement"),
                addr("brokers"),
                &config.ledger,
            ),
            brokers,
            vault: RewardVault::new(addr("vault"), addr("settlement")),
            engine: SettlementEngine::new(
                addr("settlement"),
                addr("owner"),
                addr("orderbook"),
                addr("registry"),
                addr("tokens"),
                addr("ledger"),
                addr("vault"),
                &config.settlement,
            ),
            broker,
            block: 1,
            nonce: 0,
        };

        d.bank.mint(ren(), addr("broker"), Amount::from(1_000u64));
        d.bank
            .approve(ren(), addr("broker"), addr("orderbook"), Amount::from(1_000u64));
        for node in ["dn-1", "dn-2", "dn-3", "dn-4"] {
            d.register_darknode(node);
        }
        d.advance(10);
        d.registry
            .epoch(&d.ctx("anyone"))
            .expect("Epoch should be cut");
        d
    }

    fn ctx(&self, who: &str) -> CallContext {
        CallContext::new(addr(who), self.block)
    }

    fn advance(&mut self, blocks: u64) {
        self.block += blocks;
    }

    fn register_darknode(&mut self, node: &str) {
        self.bank.mint(ren(), addr("operator"), Amount::from(BOND));
        self.bank
            .approve(ren(), addr("operator"), addr("registry"), Amount::from(BOND));
        let ctx = self.ctx("operator");
        self.registry
            .register(&ctx, &mut self.bank, addr(node), vec![1, 2, 3], Amount::from(BOND))
            .expect("Darknode registration should succeed");
    }

    fn deposit(&mut self, trader: Address, token: Address, value: Amount) {
        self.bank.mint(token, trader, value);
        let mut ctx = CallContext::new(trader, self.block);
        if token == Address::ETHEREUM {
            ctx = ctx.with_value(value);
        } else {
            self.bank.approve(token, trader, addr("ledger"), value);
        }
        self.ledger
            .deposit(&ctx, &mut self.bank, token, value)
            .expect("Deposit should succeed");
    }

    /// Open the order through the broker and reveal its details.
    fn place(
        &mut self,
        trader: &TestSigner,
        parity: OrderParity,
        details: OrderDetails,
    ) -> OrderId {
        self.nonce += 1;
        let prefix = self.nonce.to_be_bytes();
        let id = details.order_id(&prefix);
        let sig = trader.sign(&open_message(&id));
        let ctx = self.ctx("broker");
        let opened = match parity {
            OrderParity::Buy => self
                .book
                .open_buy_order(&ctx, &Ed25519Verifier, &mut self.bank, &sig, id),
            OrderParity::Sell => self
                .book
                .open_sell_order(&ctx, &Ed25519Verifier, &mut self.bank, &sig, id),
        };
        opened.expect("Order should open");
        let submitted = self
            .engine
            .submit_order(&ctx.with_gas_price(20), &self.book, &prefix, details)
            .expect("Details should be accepted");
        assert_eq!(submitted, id);
        id
    }

    fn confirm(&mut self, darknode: &str, order: OrderId, matched: OrderId) -> Result<()> {
        let ctx = self.ctx(darknode);
        self.book.confirm_order(&ctx, &self.registry, order, matched)
    }

    fn settle(&mut self, buy: OrderId, sell: OrderId) -> Result<()> {
        let ctx = self.ctx("relayer");
        let mut c = Collaborators {
            orderbook: &self.book,
            tokens: &self.tokens,
            ledger: &mut self.ledger,
            vault: &mut self.vault,
        };
        self.engine.settle(&ctx, &mut c, buy, sell)
    }

    fn slash(&mut self, guilty: OrderId) -> Result<()> {
        let ctx = self.ctx("slasher");
        let mut c = Collaborators {
            orderbook: &self.book,
            tokens: &self.tokens,
            ledger: &mut self.ledger,
            vault: &mut self.vault,
        };
        self.engine.slash(
            &ctx,
            &mut c,
            &mut self.registry,
            &mut self.bank,
            guilty,
            (addr("dn-2"), addr("dn-3")),
        )
    }

    fn withdraw(
        &mut self,
        trader: Address,
        token: Address,
        value: Amount,
        sig: &[u8],
    ) -> Result<()> {
        let ctx = CallContext::new(trader, self.block);
        self.ledger
            .withdraw(&ctx, &mut self.bank, &mut self.brokers, token, value, sig)
    }

    fn balance(&self, trader: Address, token: Address) -> Amount {
        self.ledger.balance(trader, token)
    }

    /// Ledger bookkeeping, supply totals and token custody all agree.
    fn assert_custody(&self) {
        for token in [Address::ETHEREUM, dgx(), ren()] {
            self.ledger
                .verify_supply(token)
                .expect("Supply conservation must hold");
            assert_eq!(
                self.bank.balance_of(token, addr("ledger")),
                self.ledger.total_balance(token),
                "ledger custody of {token}"
            );
        }
    }
}

/// Alice holds 1000 ETH and buys DGX; Bob holds 1000 DGX and sells.
fn traders(d: &mut Deployment) -> (TestSigner, TestSigner) {
    let alice = TestSigner::from_seed(1);
    let bob = TestSigner::from_seed(2);
    d.deposit(alice.address(), Address::ETHEREUM, units(1_000, 18));
    d.deposit(bob.address(), dgx(), units(1_000, 9));
    (alice, bob)
}

fn eth_dgx(price_str: &str, volume_str: &str) -> OrderDetails {
    OrderDetails::dummy(TokenPair::new(ETH, DGX), price(price_str), volume(volume_str))
}

// =============================================================================
// Test: deposit -> confirm -> settle, with the darknode fee on both legs
// =============================================================================
#[test]
fn e2e_simple_settlement() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);

    // Alice buys 100 DGX @ 0.05 ETH; Bob sells 100 DGX @ 0.05 ETH.
    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "100"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.05", "100"));
    d.advance(1);
    d.confirm("dn-1", buy, sell).expect("dn-1 confirms");
    assert_eq!(d.book.order_match(buy), Some(sell));
    assert_eq!(d.book.order_match(sell), Some(buy));

    d.settle(buy, sell).expect("Settlement should succeed");

    // 5 ETH for 100 DGX, 0.2% of each leg to the reward vault.
    let (a, b) = (alice.address(), bob.address());
    assert_eq!(d.balance(a, Address::ETHEREUM), units(995, 18));
    assert_eq!(d.balance(b, Address::ETHEREUM), units(499, 16));
    assert_eq!(d.balance(a, dgx()), units(998, 8));
    assert_eq!(d.balance(b, dgx()), units(900, 9));
    assert_eq!(d.balance(addr("vault"), Address::ETHEREUM), units(1, 16));
    assert_eq!(d.balance(addr("vault"), dgx()), units(2, 8));
    assert_eq!(d.vault.balance(addr("dn-1"), dgx()), units(2, 8));

    let details = d
        .engine
        .get_match_details(&d.book, &d.tokens, buy)
        .expect("Match details available");
    assert!(details.settled);
    assert_eq!(details.matched_id, sell);
    assert_eq!(details.priority_volume + details.priority_fee, units(5, 18));
    assert_eq!(details.secondary_volume + details.secondary_fee, units(100, 9));
    assert_eq!(details.priority_trader, a);
    assert_eq!(details.secondary_trader, b);

    assert_eq!(
        d.settle(buy, sell).unwrap_err(),
        DarkpoolError::AlreadySettled(buy)
    );
    d.assert_custody();
}

// =============================================================================
// Test: partial fill at the mid price
// =============================================================================
#[test]
fn e2e_partial_fill_at_mid_price() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);

    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.06", "10"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.04", "25"));
    d.confirm("dn-2", sell, buy).expect("dn-2 confirms");
    d.settle(buy, sell).expect("Settlement should succeed");

    // 10 DGX at 0.05 ETH.
    let details = d
        .engine
        .get_match_details(&d.book, &d.tokens, sell)
        .expect("Match details available");
    assert!(!details.order_is_buy);
    assert_eq!(details.priority_volume + details.priority_fee, units(5, 17));
    assert_eq!(details.secondary_volume + details.secondary_fee, units(10, 9));
    assert_eq!(d.vault.balance(addr("dn-2"), Address::ETHEREUM), units(1, 15));
    d.assert_custody();
}

// =============================================================================
// Test: incompatible confirmation is slashed and never settles
// =============================================================================
#[test]
fn e2e_slash_incompatible_pair() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);
    let operator_ren = d.bank.balance_of(ren(), addr("operator"));

    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "1"));
    let sell = d.place(
        &bob,
        OrderParity::Sell,
        OrderDetails::dummy(TokenPair::new(ETH, REN), price("0.05"), volume("1")),
    );
    d.confirm("dn-1", buy, sell).expect("dn-1 confirms anyway");
    assert!(matches!(
        d.settle(buy, sell),
        Err(DarkpoolError::IncompatibleOrders { .. })
    ));

    d.advance(5);
    d.slash(buy).expect("Slasher slashes the confirmation");

    assert_eq!(d.engine.order_status(buy), SettlementStatus::Slashed);
    assert_eq!(d.engine.order_status(sell), SettlementStatus::Slashed);
    assert!(d.registry.darknode(addr("dn-1")).is_none());
    // Half the bond back, a quarter of the penalty to each challenger owner,
    // the rest forfeited. The operator owns all of them.
    assert_eq!(
        d.bank.balance_of(ren(), addr("operator")),
        operator_ren + Amount::from(BOND / 2 + BOND / 4)
    );
    assert_eq!(d.registry.forfeited_bonds(), Amount::from(BOND / 4));
    assert_eq!(d.settle(buy, sell).unwrap_err(), DarkpoolError::OrderSlashed(buy));
    d.assert_custody();
}

// =============================================================================
// Test: slashing a settled match restores both traders
// =============================================================================
#[test]
fn e2e_slash_reverses_settlement() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);
    let (a, b) = (alice.address(), bob.address());

    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "100"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.05", "100"));
    d.confirm("dn-1", buy, sell).expect("dn-1 confirms");
    d.settle(buy, sell).expect("Settlement should succeed");
    d.slash(sell).expect("Slasher reverses the match");

    assert_eq!(d.balance(a, Address::ETHEREUM), units(1_000, 18));
    assert_eq!(d.balance(b, dgx()), units(1_000, 9));
    assert!(d.balance(a, dgx()).is_zero());
    assert!(d.balance(b, Address::ETHEREUM).is_zero());
    assert!(d.vault.total(dgx()).is_zero());
    d.assert_custody();
}

// =============================================================================
// Test: darknode rewards reach the owner and can leave the ledger
// =============================================================================
#[test]
fn e2e_reward_withdrawal() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);
    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "100"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.05", "100"));
    d.confirm("dn-1", buy, sell).expect("dn-1 confirms");
    d.settle(buy, sell).expect("Settlement should succeed");

    let ctx = d.ctx("operator");
    let mut c = Collaborators {
        orderbook: &d.book,
        tokens: &d.tokens,
        ledger: &mut d.ledger,
        vault: &mut d.vault,
    };
    let reward = d
        .engine
        .withdraw_reward(&ctx, &mut c, &d.registry, addr("dn-1"), dgx())
        .expect("Owner withdraws rewards");
    assert_eq!(reward, units(2, 8));
    assert_eq!(d.balance(addr("operator"), dgx()), reward);

    // The operator then leaves through the signal path.
    let signal = d.ctx("operator");
    d.ledger.signal_backup_withdraw(&signal, dgx());
    d.advance(20);
    d.withdraw(addr("operator"), dgx(), reward, &[])
        .expect("Matured signal withdraws");
    assert_eq!(d.bank.balance_of(dgx(), addr("operator")), reward);
    d.assert_custody();
}

// =============================================================================
// Test: signal-path withdrawal timing
// =============================================================================
#[test]
fn e2e_signal_withdrawal_timing() {
    let mut d = Deployment::new();
    let (alice, _) = traders(&mut d);
    let a = alice.address();
    let value = units(10, 18);

    assert_eq!(
        d.withdraw(a, Address::ETHEREUM, value, &[]).unwrap_err(),
        DarkpoolError::WithdrawalNotAuthorized { trader: a }
    );

    let signaled_at = d.block;
    d.ledger
        .signal_backup_withdraw(&CallContext::new(a, signaled_at), Address::ETHEREUM);
    d.advance(19);
    assert_eq!(
        d.withdraw(a, Address::ETHEREUM, value, &[]).unwrap_err(),
        DarkpoolError::SignalNotMatured {
            matures_at: signaled_at + 20
        }
    );
    d.advance(1);
    d.withdraw(a, Address::ETHEREUM, value, &[])
        .expect("Withdrawal succeeds once the signal matures");
    assert_eq!(d.bank.balance_of(Address::ETHEREUM, a), value);

    // The signal was consumed.
    assert!(d.withdraw(a, Address::ETHEREUM, value, &[]).is_err());
    d.assert_custody();
}

// =============================================================================
// Test: broker co-signed withdrawal is immediate and not replayable
// =============================================================================
#[test]
fn e2e_broker_withdrawal() {
    let mut d = Deployment::new();
    let (_, bob) = traders(&mut d);
    let b = bob.address();
    let value = units(40, 9);

    let sig = d.broker.sign(&withdraw_message(&b, d.brokers.nonce(b)));
    d.withdraw(b, dgx(), value, &sig)
        .expect("Broker signature authorizes the withdrawal");
    assert_eq!(d.bank.balance_of(dgx(), b), value);
    assert_eq!(d.brokers.nonce(b), Amount::one());

    assert_eq!(
        d.withdraw(b, dgx(), value, &sig).unwrap_err(),
        DarkpoolError::WithdrawalNotAuthorized { trader: b }
    );
    d.assert_custody();
}

// =============================================================================
// Test: only the current cohort confirms
// =============================================================================
#[test]
fn e2e_new_darknode_waits_for_epoch() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);
    d.register_darknode("dn-5");

    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "1"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.05", "1"));
    assert_eq!(
        d.confirm("dn-5", buy, sell).unwrap_err(),
        DarkpoolError::NotRegisteredDarknode(addr("dn-5"))
    );

    d.advance(10);
    let ctx = d.ctx("anyone");
    d.registry.epoch(&ctx).expect("Next epoch");
    d.confirm("dn-5", buy, sell).expect("dn-5 confirms after the epoch");
    assert_eq!(d.book.order_confirmer(buy), Some(addr("dn-5")));
    d.settle(buy, sell).expect("Settlement should succeed");
    assert_eq!(
        d.vault.balance(addr("dn-5"), Address::ETHEREUM),
        units(1, 14)
    );
}

// =============================================================================
// Test: canceled orders never confirm; opening fees reach the orderbook
// =============================================================================
#[test]
fn e2e_cancel_and_opening_fees() {
    let mut d = Deployment::new();
    let (alice, bob) = traders(&mut d);

    let buy = d.place(&alice, OrderParity::Buy, eth_dgx("0.05", "1"));
    let sell = d.place(&bob, OrderParity::Sell, eth_dgx("0.05", "1"));
    assert_eq!(
        d.bank.balance_of(ren(), addr("orderbook")),
        Amount::from(2 * OPENING_FEE)
    );

    let sig = alice.sign(&cancel_message(&buy));
    d.book
        .cancel_order(&Ed25519Verifier, &sig, buy)
        .expect("Trader cancels");
    assert!(matches!(
        d.confirm("dn-1", buy, sell),
        Err(DarkpoolError::WrongOrderState { .. })
    ));
    assert!(matches!(
        d.settle(buy, sell),
        Err(DarkpoolError::WrongOrderState { .. })
    ));
}

// =============================================================================
// Test: submissions above the gas price limit are refused
// =============================================================================
#[test]
fn e2e_submission_gas_price_limit() {
    let mut d = Deployment::new();
    let (alice, _) = traders(&mut d);
    let details = eth_dgx("0.05", "1");
    let id = details.order_id(b"late");
    let sig = alice.sign(&open_message(&id));
    let ctx = d.ctx("broker");
    d.book
        .open_buy_order(&ctx, &Ed25519Verifier, &mut d.bank, &sig, id)
        .expect("Order opens");

    assert_eq!(
        d.engine
            .submit_order(&ctx.with_gas_price(51), &d.book, b"late", details)
            .unwrap_err(),
        DarkpoolError::GasPriceTooHigh {
            gas_price: 51,
            limit: 50
        }
    );
    assert_eq!(d.engine.order_status(id), SettlementStatus::None);
    d.engine
        .submit_order(&ctx.with_gas_price(50), &d.book, b"late", details)
        .expect("At the limit is accepted");
}
