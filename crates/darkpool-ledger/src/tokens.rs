//! Token metadata registry.
//!
//! Maps a numeric [`TokenCode`] to the token's address and decimals. Once
//! a code has been used, it stays bound to the same address and decimals:
//! deregistering only clears the `registered` flag, and registering the
//! code again must repeat the original details.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use darkpool_types::{
    Address, CallContext, DarkpoolError, Event, EventLog, Ownable, Result, TokenCode,
};

/// Metadata of a registered (or previously registered) token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    pub address: Address,
    pub decimals: u8,
    pub registered: bool,
}

/// Read-only token metadata lookup.
pub trait TokenMetadata {
    /// Address the metadata provider is deployed at.
    fn address(&self) -> Address;

    /// Details for `code`, including deregistered tokens.
    fn token_details(&self, code: TokenCode) -> Option<TokenDetails>;

    /// Details for `code`, failing unless it is currently registered.
    fn registered_token(&self, code: TokenCode) -> Result<TokenDetails> {
        self.token_details(code)
            .filter(|t| t.registered)
            .ok_or(DarkpoolError::TokenNotRegistered(code))
    }
}

/// Owner-managed token registry.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    address: Address,
    ownable: Ownable,
    tokens: HashMap<TokenCode, TokenDetails>,
    events: EventLog,
}

impl TokenRegistry {
    #[must_use]
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            ownable: Ownable::new(owner),
            tokens: HashMap::new(),
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Register `code` for the token at `address` with `decimals`.
    pub fn register_token(
        &mut self,
        ctx: &CallContext,
        code: TokenCode,
        address: Address,
        decimals: u8,
    ) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        if code.0 == 0 {
            return Err(DarkpoolError::Configuration("token code 0 is reserved".into()));
        }
        if let Some(existing) = self.tokens.get(&code) {
            if existing.registered {
                return Err(DarkpoolError::TokenAlreadyRegistered(code));
            }
            if existing.address != address || existing.decimals != decimals {
                return Err(DarkpoolError::TokenDetailsMismatch(code));
            }
        }

        self.tokens.insert(
            code,
            TokenDetails {
                address,
                decimals,
                registered: true,
            },
        );
        tracing::info!(code = %code, address = %address, decimals, "Token registered");
        self.events.emit(Event::TokenRegistered {
            code,
            address,
            decimals,
        });
        Ok(())
    }

    pub fn deregister_token(&mut self, ctx: &CallContext, code: TokenCode) -> Result<()> {
        self.ownable.require_owner(ctx)?;
        let token = self
            .tokens
            .get_mut(&code)
            .filter(|t| t.registered)
            .ok_or(DarkpoolError::TokenNotRegistered(code))?;
        token.registered = false;

        tracing::info!(code = %code, "Token deregistered");
        self.events.emit(Event::TokenDeregistered { code });
        Ok(())
    }

    #[must_use]
    pub fn token(&self, code: TokenCode) -> Option<TokenDetails> {
        self.tokens.get(&code).copied()
    }

    #[must_use]
    pub fn is_registered(&self, code: TokenCode) -> bool {
        self.tokens.get(&code).is_some_and(|t| t.registered)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<()> {
        self.ownable
            .transfer_ownership(ctx, new_owner, &mut self.events)
    }
}

impl TokenMetadata for TokenRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn token_details(&self, code: TokenCode) -> Option<TokenDetails> {
        self.token(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> CallContext {
        CallContext::new(Address::derived("owner"), 1)
    }

    fn registry() -> TokenRegistry {
        TokenRegistry::new(Address::derived("tokens"), Address::derived("owner"))
    }

    #[test]
    fn register_and_lookup() {
        let mut tokens = registry();
        tokens
            .register_token(&owner(), TokenCode(1), Address::ETHEREUM, 18)
            .unwrap();
        assert!(tokens.is_registered(TokenCode(1)));
        let details = tokens.registered_token(TokenCode(1)).unwrap();
        assert_eq!(details.address, Address::ETHEREUM);
        assert_eq!(details.decimals, 18);
        assert_eq!(
            tokens.registered_token(TokenCode(2)).unwrap_err(),
            DarkpoolError::TokenNotRegistered(TokenCode(2))
        );
    }

    #[test]
    fn only_owner_registers() {
        let mut tokens = registry();
        let err = tokens
            .register_token(
                &CallContext::new(Address::derived("mallory"), 1),
                TokenCode(1),
                Address::ETHEREUM,
                18,
            )
            .unwrap_err();
        assert!(matches!(err, DarkpoolError::NotOwner { .. }));
    }

    #[test]
    fn code_zero_reserved() {
        let mut tokens = registry();
        assert!(
            tokens
                .register_token(&owner(), TokenCode(0), Address::ETHEREUM, 18)
                .is_err()
        );
    }

    #[test]
    fn reregistration_must_match() {
        let mut tokens = registry();
        let dgx = Address::derived("dgx");
        tokens.register_token(&owner(), TokenCode(256), dgx, 9).unwrap();
        assert_eq!(
            tokens
                .register_token(&owner(), TokenCode(256), dgx, 9)
                .unwrap_err(),
            DarkpoolError::TokenAlreadyRegistered(TokenCode(256))
        );

        tokens.deregister_token(&owner(), TokenCode(256)).unwrap();
        assert!(!tokens.is_registered(TokenCode(256)));
        assert!(tokens.registered_token(TokenCode(256)).is_err());
        assert_eq!(tokens.token_details(TokenCode(256)).map(|t| t.address), Some(dgx));

        assert_eq!(
            tokens
                .register_token(&owner(), TokenCode(256), dgx, 18)
                .unwrap_err(),
            DarkpoolError::TokenDetailsMismatch(TokenCode(256))
        );
        assert_eq!(
            tokens
                .register_token(&owner(), TokenCode(256), Address::derived("other"), 9)
                .unwrap_err(),
            DarkpoolError::TokenDetailsMismatch(TokenCode(256))
        );
        tokens.register_token(&owner(), TokenCode(256), dgx, 9).unwrap();
        assert!(tokens.is_registered(TokenCode(256)));
        assert_eq!(tokens.events().len(), 3);
    }

    #[test]
    fn deregister_unknown_fails() {
        let mut tokens = registry();
        assert_eq!(
            tokens.deregister_token(&owner(), TokenCode(7)).unwrap_err(),
            DarkpoolError::TokenNotRegistered(TokenCode(7))
        );
    }

    #[test]
    fn details_serde_roundtrip() {
        let mut tokens = registry();
        tokens
            .register_token(&owner(), TokenCode(256), Address::derived("dgx"), 9)
            .unwrap();
        let details = tokens.registered_token(TokenCode(256)).unwrap();
        let json = serde_json::to_string(&details).unwrap();
        let back: TokenDetails = serde_json::from_str(&json).unwrap();
        assert_eq!(details, back);
    }
}
