//! Per-call execution context.
//!
//! Every mutating operation runs as one atomic, serialized call. The
//! context carries what the call knows about its environment: who sent
//! it, at which block, at what gas price, and with how much native coin
//! attached.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BlockNumber};

/// Caller, block and value of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// The account making the call.
    pub sender: Address,
    /// Block height at which the call executes.
    pub block_number: BlockNumber,
    /// Gas price of the enclosing transaction.
    pub gas_price: u64,
    /// Native coin attached to the call.
    pub value: Amount,
}

impl CallContext {
    #[must_use]
    pub fn new(sender: Address, block_number: BlockNumber) -> Self {
        Self {
            sender,
            block_number,
            gas_price: 0,
            value: Amount::zero(),
        }
    }

    #[must_use]
    pub fn with_gas_price(mut self, gas_price: u64) -> Self {
        self.gas_price = gas_price;
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }

    /// Context for a nested call made by the component at `sender`.
    ///
    /// The block and gas price carry over; no value is forwarded.
    #[must_use]
    pub fn forward(&self, sender: Address) -> Self {
        Self {
            sender,
            block_number: self.block_number,
            gas_price: self.gas_price,
            value: Amount::zero(),
        }
    }
}
