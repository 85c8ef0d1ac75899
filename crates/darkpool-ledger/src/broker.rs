//! Broker co-signatures for immediate withdrawals.
//!
//! A broker authorizes a trader's withdrawal by signing
//! [`withdraw_message`] over the trader's current nonce. The ledger checks
//! the signature with [`BrokerVerifier::verify_withdraw_signature`] and,
//! once the withdrawal has gone through, consumes it so the same
//! authorization cannot be replayed.

use std::collections::{HashMap, HashSet};

use darkpool_types::{
    Address, Amount, CallContext, DarkpoolError, Event, EventLog, Ownable, Result,
    SignatureVerifier, withdraw_message,
};

/// Withdrawal authorization capability consumed by the balance ledger.
pub trait BrokerVerifier {
    /// Address the verifier is deployed at.
    fn address(&self) -> Address;

    /// Whether `signature` is a broker's authorization of `trader`'s next
    /// withdrawal. Fails if the caller is not the ledger.
    fn verify_withdraw_signature(
        &self,
        ctx: &CallContext,
        trader: Address,
        signature: &[u8],
    ) -> Result<bool>;

    /// Mark `trader`'s current authorization as used.
    fn consume_withdraw_signature(&mut self, ctx: &CallContext, trader: Address) -> Result<()>;
}

/// Owner-managed broker set with per-trader replay nonces.
#[derive(Debug, Clone)]
pub struct SignedBrokerVerifier<V> {
    address: Address,
    ownable: Ownable,
    /// The only caller allowed to verify and consume signatures.
    ledger: Address,
    brokers: HashSet<Address>,
    nonces: HashMap<Address, Amount>,
    verifier: V,
    events: EventLog,
}

impl<V: SignatureVerifier> SignedBrokerVerifier<V> {
    #[must_use]
    pub fn new(address: Address, owner: Address, ledger: Address, verifier: V) -> Self {
        Self {
            address,
            ownable: Ownable::new(owner),
            ledger,
            brokers: HashSet::new(),
            nonces: HashMap::new(),
            verifier,
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn register_broker(&mut self, ctx: &CallContext, broker: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        if !self.brokers.insert(broker) {
            return Err(DarkpoolError::BrokerAlreadyRegistered(broker));
        }
        tracing::info!(broker = %broker, "Broker registered");
        self.events.emit(Event::BrokerRegistered { broker });
        Ok(())
    }

    pub fn deregister_broker(&mut self, ctx: &CallContext, broker: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        if !self.brokers.remove(&broker) {
            return Err(DarkpoolError::BrokerNotRegistered(broker));
        }
        tracing::info!(broker = %broker, "Broker deregistered");
        self.events.emit(Event::BrokerDeregistered { broker });
        Ok(())
    }

    #[must_use]
    pub fn is_broker(&self, who: Address) -> bool {
        self.brokers.contains(&who)
    }

    /// Nonce the next authorization for `trader` must sign.
    #[must_use]
    pub fn nonce(&self, trader: Address) -> Amount {
        self.nonces.get(&trader).copied().unwrap_or_default()
    }

    /// Point the verifier at a new ledger.
    pub fn update_ledger(&mut self, ctx: &CallContext, ledger: Address) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        self.ledger = ledger;
        Ok(())
    }

    fn require_ledger(&self, ctx: &CallContext, operation: &'static str) -> Result<()> {
        if ctx.sender != self.ledger {
            return Err(DarkpoolError::Unauthorized {
                caller: ctx.sender,
                operation,
            });
        }
        Ok(())
    }
}

impl<V: SignatureVerifier> BrokerVerifier for SignedBrokerVerifier<V> {
    fn address(&self) -> Address {
        self.address
    }

    fn verify_withdraw_signature(
        &self,
        ctx: &CallContext,
        trader: Address,
        signature: &[u8],
    ) -> Result<bool> {
        self.require_ledger(ctx, "verify_withdraw_signature")?;
        let message = withdraw_message(&trader, self.nonce(trader));
        match self.verifier.recover(&message, signature) {
            Ok(signer) if self.brokers.contains(&signer) => Ok(true),
            Ok(signer) => {
                tracing::warn!(trader = %trader, signer = %signer, "Withdrawal signed by non-broker");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(trader = %trader, error = %e, "Withdrawal signature rejected");
                Ok(false)
            }
        }
    }

    fn consume_withdraw_signature(&mut self, ctx: &CallContext, trader: Address) -> Result<()> {
        self.require_ledger(ctx, "consume_withdraw_signature")?;
        let nonce = self.nonces.entry(trader).or_default();
        *nonce = nonce.saturating_add(Amount::one());
        Ok(())
    }
}
