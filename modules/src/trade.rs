//! # Trade
//!
//! Lets a basket's manager swap one default position into another through
//! any venue bound for this module in the adapter directory.
//!
//! The module never trusts the adapter's own account of what happened. It
//! measures the basket's balances before and after, requires the source
//! spend to match the requested notional exactly and the destination
//! receipt to meet the minimum, and then derives both new units from the
//! measured balances.

use serde::{Deserialize, Serialize};
use tracing::info;
use trove_protocol::adapter::{ensure_received, reconcile, Intent, Tolerance};
use trove_protocol::math::{default_unit_after_change, precise_mul, to_signed};
use trove_protocol::{Address, Engine, LedgerError};

use crate::error::ModuleError;
use crate::module::{require_manager, Module};

/// A trade request, in per-share units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeParams {
    /// Integration name bound for this module.
    pub integration: String,
    pub source: Address,
    pub destination: Address,
    /// Units of `source` per share to sell.
    #[serde(with = "trove_protocol::math::u128_string")]
    pub source_unit: u128,
    /// Minimum units of `destination` per share to receive.
    #[serde(with = "trove_protocol::math::u128_string")]
    pub min_destination_unit: u128,
}

/// What a trade actually moved, in basket-wide token amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeReceipt {
    pub spent: u128,
    pub received: u128,
}

/// Manager-driven swaps between default positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeModule {
    address: Address,
}

impl TradeModule {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Executes `params` on `basket`.
    ///
    /// # Errors
    ///
    /// - [`ModuleError::NotManager`] unless `caller` manages the basket.
    /// - `InvalidArgument` for a zero or oversized source unit, identical
    ///   assets, or an empty basket.
    /// - `UnknownIntegration` if nothing is bound under the name.
    /// - `SlippageOrReconciliation` if the venue spent a different amount or
    ///   delivered less than the minimum.
    pub fn trade(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        params: &TradeParams,
    ) -> Result<TradeReceipt, ModuleError> {
        require_manager(engine, caller, basket)?;
        if params.source == params.destination {
            return Err(ModuleError::invalid("source and destination must differ"));
        }
        if params.source_unit == 0 {
            return Err(ModuleError::invalid("source unit must be positive"));
        }

        engine.operate(&self.address, basket, |engine| {
            let (supply, scale, source_unit_before, destination_unit_before) = {
                let target = engine.basket(basket)?;
                if target.total_supply() == 0 {
                    return Err(ModuleError::invalid("basket has no supply to trade"));
                }
                if !target.has_sufficient_default_units(&params.source, params.source_unit) {
                    return Err(ModuleError::invalid(format!(
                        "basket holds less than {} units of {}",
                        params.source_unit, params.source
                    )));
                }
                (
                    target.total_supply(),
                    target.unit_scale(),
                    target.default_unit(&params.source),
                    target.default_unit(&params.destination),
                )
            };
            if destination_unit_before < 0 {
                return Err(ModuleError::invalid("destination has a negative default position"));
            }

            let send = precise_mul(params.source_unit, supply, scale)?;
            let min_receive = precise_mul(params.min_destination_unit, supply, scale)?;

            let source_before = engine.balance_of(&params.source, basket);
            let destination_before = engine.balance_of(&params.destination, basket);

            let adapter = engine.resolve(&self.address, &params.integration)?;
            let quote = engine.quote(
                adapter.as_ref(),
                basket,
                &Intent::Swap {
                    source: params.source.clone(),
                    destination: params.destination.clone(),
                    source_amount: send,
                    min_destination_amount: min_receive,
                },
            )?;
            engine.invoke(&self.address, basket, &adapter, &quote.call_data)?;

            let source_after = engine.balance_of(&params.source, basket);
            let destination_after = engine.balance_of(&params.destination, basket);

            let spent = to_signed(source_before)? - to_signed(source_after)?;
            reconcile(&params.source, to_signed(send)?, spent, Tolerance::Exact)?;
            let delivered = to_signed(destination_after)? - to_signed(destination_before)?;
            let received = u128::try_from(delivered).map_err(|_| LedgerError::SlippageOrReconciliation {
                asset: params.destination.clone(),
                expected: i128::try_from(min_receive).unwrap_or(i128::MAX),
                actual: delivered,
            })?;
            ensure_received(&params.destination, min_receive, received)?;

            let source_unit = default_unit_after_change(
                supply,
                source_before,
                source_after,
                source_unit_before,
                scale,
            )?;
            let destination_unit = default_unit_after_change(
                supply,
                destination_before,
                destination_after,
                destination_unit_before,
                scale,
            )?;
            engine.edit_default_position(&self.address, basket, &params.source, source_unit)?;
            engine.edit_default_position(&self.address, basket, &params.destination, destination_unit)?;

            info!(
                basket = %basket,
                integration = %params.integration,
                source = %params.source,
                destination = %params.destination,
                spent = %send,
                received = %received,
                "trade executed"
            );
            Ok(TradeReceipt {
                spent: send,
                received,
            })
        })
    }
}

impl Module for TradeModule {
    fn address(&self) -> &Address {
        &self.address
    }

    fn name(&self) -> &'static str {
        "trade"
    }
}
