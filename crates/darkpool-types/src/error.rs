//! Error types for the darkpool settlement core.
//!
//! All errors use the `DP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by failure class:
//! - 1xx: Authorization (wrong caller, bad signature)
//! - 2xx: State-machine violations (order / darknode in the wrong state)
//! - 3xx: Policy violations (bond, gas price, pod size, epoch interval)
//! - 4xx: Arithmetic / balance failures
//! - 5xx: Token and transfer failures
//! - 9xx: Configuration / internal errors
//!
//! Every error is an atomic revert: the operation that returned it left no
//! state behind.

use thiserror::Error;

use crate::{Address, Amount, OrderId, OrderState, TokenCode};

/// Central error enum for all darkpool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DarkpoolError {
    // =================================================================
    // Authorization (1xx)
    // =================================================================
    /// Caller is not the owner of the component.
    #[error("DP_ERR_100: {caller} is not the owner")]
    NotOwner { caller: Address },

    /// Caller is not the owner of the darknode.
    #[error("DP_ERR_101: {caller} does not own darknode {node}")]
    NotDarknodeOwner { caller: Address, node: Address },

    /// Caller is not the designated slasher.
    #[error("DP_ERR_102: {caller} is not the slasher")]
    NotSlasher { caller: Address },

    /// Caller is not a darknode registered in the current epoch.
    #[error("DP_ERR_103: {0} is not a registered darknode")]
    NotRegisteredDarknode(Address),

    /// Caller is not the component allowed to invoke this entry point.
    #[error("DP_ERR_104: {caller} is not authorized to call {operation}")]
    Unauthorized {
        caller: Address,
        operation: &'static str,
    },

    /// The signature did not recover to the expected signer.
    #[error("DP_ERR_105: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Neither a broker signature nor a matured withdrawal signal authorizes
    /// the withdrawal.
    #[error("DP_ERR_106: Withdrawal not authorized for {trader}")]
    WithdrawalNotAuthorized { trader: Address },

    // =================================================================
    // State machine (2xx)
    // =================================================================
    /// The darknode has no record in the registry.
    #[error("DP_ERR_200: Darknode not found: {0}")]
    DarknodeNotFound(Address),

    /// A darknode with this ID is already registered or pending.
    #[error("DP_ERR_201: Darknode already registered: {0}")]
    DarknodeAlreadyRegistered(Address),

    /// The darknode cannot be deregistered in its current state.
    #[error("DP_ERR_202: Darknode {0} must be registered and not already deregistering")]
    NotDeregisterable(Address),

    /// The darknode bond cannot be refunded yet.
    #[error("DP_ERR_203: Darknode {0} is not refundable")]
    NotRefundable(Address),

    /// The order is not in the state required by the operation.
    #[error("DP_ERR_204: Order {id} is {actual}, expected {expected}")]
    WrongOrderState {
        id: OrderId,
        expected: OrderState,
        actual: OrderState,
    },

    /// An order with this ID already exists.
    #[error("DP_ERR_205: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The two orders of a confirmation do not form a buy/sell pair.
    #[error("DP_ERR_206: Orders {0} and {1} have the same parity")]
    SameParity(OrderId, OrderId),

    /// The two orders are not confirmed against each other.
    #[error("DP_ERR_207: Orders {0} and {1} are not matched")]
    OrdersNotMatched(OrderId, OrderId),

    /// Settlement detail for the order has not been submitted.
    #[error("DP_ERR_208: Order details not submitted: {0}")]
    OrderNotSubmitted(OrderId),

    /// Settlement detail for the order was already submitted.
    #[error("DP_ERR_209: Order details already submitted: {0}")]
    OrderAlreadySubmitted(OrderId),

    /// The order was already settled (idempotency guard).
    #[error("DP_ERR_210: Order already settled: {0}")]
    AlreadySettled(OrderId),

    /// The order was slashed and can never settle.
    #[error("DP_ERR_211: Order slashed: {0}")]
    OrderSlashed(OrderId),

    /// Slash challengers must be two distinct darknodes other than the prover.
    #[error("DP_ERR_212: Invalid challengers {challenger1}, {challenger2} for prover {prover}")]
    InvalidChallengers {
        prover: Address,
        challenger1: Address,
        challenger2: Address,
    },

    /// The zero address cannot identify a darknode.
    #[error("DP_ERR_213: Invalid darknode id {0}")]
    InvalidDarknodeId(Address),

    /// The broker is already in the broker set.
    #[error("DP_ERR_214: Broker already registered: {0}")]
    BrokerAlreadyRegistered(Address),

    /// The broker is not in the broker set.
    #[error("DP_ERR_215: Broker not registered: {0}")]
    BrokerNotRegistered(Address),

    // =================================================================
    // Policy (3xx)
    // =================================================================
    /// Bond is below the registry minimum.
    #[error("DP_ERR_300: Bond {bond} is below minimum {minimum}")]
    BondTooLow { bond: Amount, minimum: Amount },

    /// The minimum epoch interval has not elapsed.
    #[error("DP_ERR_301: Epoch interval not elapsed: next epoch at block {next_block}")]
    EpochIntervalNotElapsed { next_block: u64 },

    /// The darknode is not part of a pod of at least the minimum size.
    #[error("DP_ERR_302: Darknode {node} is not in a pod of at least {minimum} darknodes")]
    PodTooSmall { node: Address, minimum: u64 },

    /// Transaction gas price exceeds the submission limit.
    #[error("DP_ERR_303: Gas price {gas_price} exceeds submission limit {limit}")]
    GasPriceTooHigh { gas_price: u64, limit: u64 },

    /// The order was submitted for a different settlement layer.
    #[error("DP_ERR_304: Invalid settlement id {0}")]
    InvalidSettlementId(u64),

    /// The two orders are not compatible (tokens, price, or volume).
    #[error("DP_ERR_305: Incompatible orders: {reason}")]
    IncompatibleOrders { reason: String },

    /// The component is paused.
    #[error("DP_ERR_306: Contract is paused")]
    Paused,

    /// Unpause was called on a component that is not paused.
    #[error("DP_ERR_308: Contract is not paused")]
    NotPaused,

    /// A signaled withdrawal was attempted before the delay elapsed.
    #[error("DP_ERR_307: Withdrawal signal matures at block {matures_at}")]
    SignalNotMatured { matures_at: u64 },

    // =================================================================
    // Arithmetic / balance (4xx)
    // =================================================================
    /// Not enough balance for the operation.
    #[error("DP_ERR_400: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    /// A checked arithmetic operation overflowed.
    #[error("DP_ERR_401: Arithmetic overflow")]
    ArithmeticOverflow,

    /// Attached native value does not match the declared deposit.
    #[error("DP_ERR_403: Attached value {attached} does not match {expected}")]
    ValueMismatch { attached: Amount, expected: Amount },

    /// Supply conservation invariant violated. Critical safety alert.
    #[error("DP_ERR_404: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Tokens (5xx)
    // =================================================================
    /// The token code is not registered.
    #[error("DP_ERR_500: Token not registered: {0}")]
    TokenNotRegistered(TokenCode),

    /// The token is already registered.
    #[error("DP_ERR_501: Token already registered: {0}")]
    TokenAlreadyRegistered(TokenCode),

    /// Re-registration must keep the original address and decimals.
    #[error("DP_ERR_502: Token {0} re-registered with different details")]
    TokenDetailsMismatch(TokenCode),

    /// An ERC20 transfer was rejected.
    #[error("DP_ERR_503: Token transfer failed: {reason}")]
    TransferFailed { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("DP_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("DP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("DP_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (reading config files).
    #[error("DP_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DarkpoolError>;

impl From<std::io::Error> for DarkpoolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DarkpoolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
