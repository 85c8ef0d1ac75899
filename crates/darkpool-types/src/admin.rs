//! Ownership and pausing for administrable components.
//!
//! Each component embeds an [`Ownable`] that gates its `update_*` entry
//! points, and optionally a [`Pausable`] that stops trading entry points
//! without touching custody.

use serde::{Deserialize, Serialize};

use crate::{Address, CallContext, DarkpoolError, Event, EventLog, Result};

/// Single-owner access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Option<Address>,
}

impl Ownable {
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self { owner: Some(owner) }
    }

    /// The current owner, or `None` once ownership is renounced.
    #[must_use]
    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    #[must_use]
    pub fn is_owner(&self, who: Address) -> bool {
        self.owner == Some(who)
    }

    /// Fail unless the caller is the owner.
    pub fn require_owner(&self, ctx: &CallContext) -> Result<()> {
        if self.is_owner(ctx.sender) {
            Ok(())
        } else {
            Err(DarkpoolError::NotOwner { caller: ctx.sender })
        }
    }

    pub fn transfer_ownership(
        &mut self,
        ctx: &CallContext,
        new_owner: Address,
        events: &mut EventLog,
    ) -> Result<()> {
        self.require_owner(ctx)?;
        if new_owner.is_zero() {
            return Err(DarkpoolError::Configuration(
                "new owner is the zero address".into(),
            ));
        }
        events.emit(Event::OwnershipTransferred {
            previous: self.owner,
            next: Some(new_owner),
        });
        self.owner = Some(new_owner);
        Ok(())
    }

    /// Give up ownership. Owner-gated entry points become unreachable.
    pub fn renounce_ownership(&mut self, ctx: &CallContext, events: &mut EventLog) -> Result<()> {
        self.require_owner(ctx)?;
        events.emit(Event::OwnershipTransferred {
            previous: self.owner,
            next: None,
        });
        self.owner = None;
        Ok(())
    }
}

/// Owner-controlled circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pausable {
    paused: bool,
}

impl Pausable {
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_not_paused(&self) -> Result<()> {
        if self.paused {
            Err(DarkpoolError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn pause(
        &mut self,
        ctx: &CallContext,
        owner: &Ownable,
        events: &mut EventLog,
    ) -> Result<()> {
        owner.require_owner(ctx)?;
        self.require_not_paused()?;
        self.paused = true;
        events.emit(Event::Paused);
        Ok(())
    }

    pub fn unpause(
        &mut self,
        ctx: &CallContext,
        owner: &Ownable,
        events: &mut EventLog,
    ) -> Result<()> {
        owner.require_owner(ctx)?;
        if !self.paused {
            return Err(DarkpoolError::NotPaused);
        }
        self.paused = false;
        events.emit(Event::Unpaused);
        Ok(())
    }
}
