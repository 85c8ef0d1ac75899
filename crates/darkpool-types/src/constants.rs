//! System-wide constants for the darkpool settlement core.

/// Darknode fee charged on each leg of a settlement: 2 / 1000 = 0.2%.
pub const DARKNODE_FEES_NUMERATOR: u64 = 2;

/// Denominator of the darknode fee rate.
pub const DARKNODE_FEES_DENOMINATOR: u64 = 1000;

/// Blocks that must pass between `signal_backup_withdraw` and a
/// broker-less withdrawal (roughly 48 hours of 15 second blocks).
pub const DEFAULT_SIGNAL_DELAY: u64 = 11_520;

/// Decimal places of the fixed-point order price.
pub const PRICE_DECIMALS: u32 = 12;

/// Decimal places of the fixed-point order volume.
pub const VOLUME_DECIMALS: u32 = 12;

/// Settlement id handled by the settlement engine.
pub const RENEX_SETTLEMENT_ID: u64 = 1;

/// Default minimum darknode bond, in bond-token base units (100,000 tokens at 18 decimals).
pub const DEFAULT_MINIMUM_BOND: u128 = 100_000 * 10u128.pow(18);

/// Default minimum number of darknodes per pod.
pub const DEFAULT_MINIMUM_POD_SIZE: u64 = 24;

/// Default minimum number of blocks between epochs (about one day).
pub const DEFAULT_MINIMUM_EPOCH_INTERVAL: u64 = 5_760;

/// Default submission gas price limit (50 gwei).
pub const DEFAULT_SUBMISSION_GAS_PRICE_LIMIT: u64 = 50_000_000_000;

/// Default fee for opening an order, in protocol-token base units.
pub const DEFAULT_ORDER_OPENING_FEE: u128 = 0;

/// Maximum page size returned by paginated queries.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Signed message prefix for opening an order.
pub const OPEN_MESSAGE_PREFIX: &[u8] = b"Republic Protocol: open: ";

/// Signed message prefix for cancelling an order.
pub const CANCEL_MESSAGE_PREFIX: &[u8] = b"Republic Protocol: cancel: ";

/// Signed message prefix for broker withdrawal authorizations.
pub const WITHDRAW_MESSAGE_PREFIX: &[u8] = b"Republic Protocol: withdraw: ";
