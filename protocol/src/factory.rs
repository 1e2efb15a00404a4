//! # Basket Factory
//!
//! The sanctioned way to create a basket. A factory must itself be approved
//! in the registry; every basket it creates is registered as enabled, which
//! is what later lets modules initialize on it.
//!
//! Addresses are derived from the factory's identity and a per-factory
//! nonce, so the same sequence of `create` calls always yields the same
//! basket addresses.

use tracing::info;

use crate::basket::BasketRequest;
use crate::engine::Engine;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::types::Address;

/// A registry-approved basket creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketFactory {
    address: Address,
}

impl BasketFactory {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Creates, seeds and registers a basket.
    ///
    /// Each component gets its default unit, each module is attached as
    /// `Pending`, and a `BasketCreated` event is emitted. Nothing is written
    /// if any check fails.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAFactory`] if this factory is not approved.
    /// - [`LedgerError::InvalidArgument`] for mismatched lengths, no
    ///   components, duplicates, non-positive units or a bad share split.
    /// - [`LedgerError::NotAModule`] if a listed module is not approved.
    pub fn create(&self, engine: &mut Engine, request: BasketRequest) -> Result<Address, LedgerError> {
        if !engine.registry().is_factory(&self.address) {
            return Err(LedgerError::NotAFactory(self.address.clone()));
        }
        engine.atomically("create_basket", |engine| {
            let basket = engine.build_basket(&self.address, &request)?;
            engine.register_basket(&self.address, &basket)?;
            info!(
                basket = %basket,
                factory = %self.address,
                manager = %request.manager,
                symbol = %request.symbol,
                components = request.components.len(),
                "basket created"
            );
            engine.emit(LedgerEvent::BasketCreated {
                basket: basket.clone(),
                factory: Some(self.address.clone()),
                manager: request.manager.clone(),
                name: request.name.clone(),
                symbol: request.symbol.clone(),
                components: request.components.clone(),
            });
            Ok(basket)
        })
    }
}
