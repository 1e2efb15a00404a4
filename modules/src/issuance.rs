//! # Basic Issuance
//!
//! Mints basket shares against a deposit of every component and redeems
//! them for a pro-rata withdrawal. Only default positions take part: a
//! component deployed externally by another module cannot be delivered on
//! demand, so it is neither required on issue nor paid out on redeem.
//!
//! Rounding favors the basket: deposits round up, payouts round down.

use tracing::info;
use trove_protocol::math::{precise_mul, precise_mul_ceil, to_unsigned};
use trove_protocol::{Address, Engine};

use crate::error::ModuleError;
use crate::module::Module;

/// Issue/redeem against default positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicIssuanceModule {
    address: Address,
}

impl BasicIssuanceModule {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Token amounts required to issue `quantity` shares, one entry per
    /// component with a positive default unit, rounded up.
    pub fn required_component_units_for_issue(
        &self,
        engine: &Engine,
        basket: &Address,
        quantity: u128,
    ) -> Result<Vec<(Address, u128)>, ModuleError> {
        let basket = engine.basket(basket)?;
        let mut required = Vec::with_capacity(basket.components().len());
        for component in basket.components() {
            let unit = basket.default_unit(component);
            if unit <= 0 {
                continue;
            }
            let amount = precise_mul_ceil(to_unsigned(unit)?, quantity, basket.unit_scale())?;
            required.push((component.clone(), amount));
        }
        Ok(required)
    }

    /// Pulls the required components from `caller` and mints `quantity`
    /// shares to `recipient`.
    ///
    /// The caller must have approved this module for each component.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero quantity; `InsufficientAllowance` or
    /// `InsufficientBalance` if the deposit cannot be pulled.
    pub fn issue(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        quantity: u128,
        recipient: &Address,
    ) -> Result<(), ModuleError> {
        if quantity == 0 {
            return Err(ModuleError::invalid("issue quantity must be positive"));
        }
        engine.operate(&self.address, basket, |engine| {
            let required = self.required_component_units_for_issue(engine, basket, quantity)?;
            for (component, amount) in &required {
                engine.transfer_from(&self.address, component, caller, basket, *amount)?;
            }
            engine.mint_shares(&self.address, basket, recipient, quantity)?;
            info!(basket = %basket, caller = %caller, recipient = %recipient, quantity = %quantity, "shares issued");
            Ok(())
        })
    }

    /// Burns `quantity` of `caller`'s shares and pays the pro-rata
    /// components to `recipient`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero quantity; `InsufficientBalance` if the
    /// caller holds fewer shares.
    pub fn redeem(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        quantity: u128,
        recipient: &Address,
    ) -> Result<Vec<(Address, u128)>, ModuleError> {
        if quantity == 0 {
            return Err(ModuleError::invalid("redeem quantity must be positive"));
        }
        engine.operate(&self.address, basket, |engine| {
            let payouts = {
                let target = engine.basket(basket)?;
                let mut payouts = Vec::new();
                for component in target.components() {
                    let unit = target.default_unit(component);
                    if unit <= 0 {
                        continue;
                    }
                    let amount = precise_mul(to_unsigned(unit)?, quantity, target.unit_scale())?;
                    payouts.push((component.clone(), amount));
                }
                payouts
            };

            engine.burn_shares(&self.address, basket, caller, quantity)?;
            for (component, amount) in &payouts {
                engine.invoke_transfer(&self.address, basket, component, recipient, *amount)?;
            }
            info!(basket = %basket, caller = %caller, recipient = %recipient, quantity = %quantity, "shares redeemed");
            Ok(payouts)
        })
    }
}

impl Module for BasicIssuanceModule {
    fn address(&self) -> &Address {
        &self.address
    }

    fn name(&self) -> &'static str {
        "basic-issuance"
    }
}
