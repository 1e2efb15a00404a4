//! # Fund Purchase
//!
//! One-step purchase of basket shares with a single quote asset.
//!
//! ```text
//! caller ──quote──► module custody ──split by share_split──► swap per component
//!                                                              │
//! recipient ◄── shares    basket ◄── required amounts ◄────────┘
//! caller    ◄── leftovers
//! ```
//!
//! Swaps run on the module's own custody, not the basket's, so the basket
//! only ever sees exact component deposits backing freshly minted shares.

use serde::{Deserialize, Serialize};
use tracing::info;
use trove_protocol::math::{mul_div, precise_mul_ceil, to_unsigned, Rounding};
use trove_protocol::{Address, Engine, LedgerError};

use crate::error::ModuleError;
use crate::module::Module;

/// A purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyParams {
    /// Integration used for every component swap.
    pub integration: String,
    /// Quote asset to spend, pulled from the caller's allowance.
    #[serde(with = "trove_protocol::math::u128_string")]
    pub quote_amount: u128,
    #[serde(with = "trove_protocol::math::u128_string")]
    pub min_shares: u128,
    pub recipient: Address,
}

/// Outcome of a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyReceipt {
    pub shares: u128,
    /// Component amounts deposited into the basket.
    pub deposited: Vec<(Address, u128)>,
    /// Amounts returned to the caller.
    pub refunded: Vec<(Address, u128)>,
}

/// Buys baskets with a single quote asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtfFundModule {
    address: Address,
    quote_asset: Address,
}

impl EtfFundModule {
    pub fn new(address: Address, quote_asset: Address) -> Self {
        Self { address, quote_asset }
    }

    pub fn quote_asset(&self) -> &Address {
        &self.quote_asset
    }

    /// Spends `params.quote_amount` of the quote asset on `basket` shares.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a zero amount, a split that is empty, all
    ///   zero or does not match the component count, or a component without
    ///   a positive default unit.
    /// - `InsufficientAllowance` if the caller has not approved the module.
    /// - `SlippageOrReconciliation` if the proceeds back no shares or fewer
    ///   than `min_shares`.
    pub fn buy(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        params: &BuyParams,
    ) -> Result<BuyReceipt, ModuleError> {
        if params.quote_amount == 0 {
            return Err(ModuleError::invalid("quote amount must be positive"));
        }

        engine.operate(&self.address, basket, |engine| {
            let (legs, scale) = {
                let target = engine.basket(basket)?;
                let components = target.components();
                let split = target.share_split();
                if split.is_empty() || split.len() != components.len() {
                    return Err(ModuleError::invalid(format!(
                        "share split has {} weights for {} components",
                        split.len(),
                        components.len()
                    )));
                }
                let mut legs = Vec::with_capacity(components.len());
                for (component, weight) in components.iter().zip(split) {
                    let unit = target.default_unit(component);
                    if unit <= 0 {
                        return Err(ModuleError::invalid(format!(
                            "component {component} has no positive default unit"
                        )));
                    }
                    legs.push((component.clone(), to_unsigned(unit)?, u128::from(*weight)));
                }
                (legs, target.unit_scale())
            };
            let total_weight: u128 = legs.iter().map(|(_, _, weight)| weight).sum();
            if total_weight == 0 {
                return Err(ModuleError::invalid("share split weights are all zero"));
            }

            let mut touched: Vec<Address> = legs.iter().map(|(component, _, _)| component.clone()).collect();
            if !touched.contains(&self.quote_asset) {
                touched.push(self.quote_asset.clone());
            }
            let opening: Vec<u128> = touched
                .iter()
                .map(|asset| engine.balance_of(asset, &self.address))
                .collect();

            engine.transfer_from(&self.address, &self.quote_asset, caller, &self.address, params.quote_amount)?;

            let adapter = engine.resolve(&self.address, &params.integration)?;
            let mut remaining = params.quote_amount;
            let mut proceeds = Vec::with_capacity(legs.len());
            for (i, (component, _, weight)) in legs.iter().enumerate() {
                let slice = if i + 1 == legs.len() {
                    remaining
                } else {
                    mul_div(params.quote_amount, *weight, total_weight, Rounding::Down)?
                };
                remaining -= slice;

                let received = if component == &self.quote_asset || slice == 0 {
                    slice
                } else {
                    let before = engine.balance_of(component, &self.address);
                    let (_, call) = adapter.quote_swap(engine, &self.address, &self.quote_asset, component, slice)?;
                    engine.call_adapter(&self.address, &adapter, &call)?;
                    engine
                        .balance_of(component, &self.address)
                        .checked_sub(before)
                        .ok_or_else(|| {
                            LedgerError::InvariantViolation(format!("swap into {component} reduced the balance"))
                        })?
                };
                proceeds.push(received);
            }

            let mut shares = u128::MAX;
            for ((_, unit, _), received) in legs.iter().zip(&proceeds) {
                shares = shares.min(mul_div(*received, scale, *unit, Rounding::Down)?);
            }
            if shares == 0 || shares < params.min_shares {
                return Err(LedgerError::SlippageOrReconciliation {
                    asset: basket.clone(),
                    expected: i128::try_from(params.min_shares.max(1)).unwrap_or(i128::MAX),
                    actual: i128::try_from(shares).unwrap_or(i128::MAX),
                }
                .into());
            }

            let mut deposited = Vec::with_capacity(legs.len());
            for (component, unit, _) in &legs {
                let amount = precise_mul_ceil(*unit, shares, scale)?;
                engine.transfer(&self.address, component, basket, amount)?;
                deposited.push((component.clone(), amount));
            }

            let mut refunded = Vec::new();
            for (asset, opening) in touched.iter().zip(opening) {
                let leftover = engine.balance_of(asset, &self.address).saturating_sub(opening);
                if leftover > 0 {
                    engine.transfer(&self.address, asset, caller, leftover)?;
                    refunded.push((asset.clone(), leftover));
                }
            }

            engine.mint_shares(&self.address, basket, &params.recipient, shares)?;
            info!(
                basket = %basket,
                caller = %caller,
                recipient = %params.recipient,
                spent = %params.quote_amount,
                shares = %shares,
                "fund shares bought"
            );
            Ok(BuyReceipt {
                shares,
                deposited,
                refunded,
            })
        })
    }
}

impl Module for EtfFundModule {
    fn address(&self) -> &Address {
        &self.address
    }

    fn name(&self) -> &'static str {
        "etf-fund"
    }
}
