//! # AMM Liquidity
//!
//! Deploys a basket's default positions into a liquidity pool and back.
//!
//! Pool tokens received are recorded as this module's **external position**
//! on the pool asset, tagged with the integration name, and the spent
//! components' default units are recomputed from measured balances. While
//! liquidity is deployed the module owns a non-zero external position, so
//! the kernel will not let it be removed from the basket.

use serde::{Deserialize, Serialize};
use tracing::info;
use trove_protocol::adapter::{ensure_received, reconcile, Intent, Tolerance};
use trove_protocol::math::{default_unit_after_change, precise_div, precise_mul, to_signed};
use trove_protocol::{Address, Engine, LedgerError};

use crate::error::ModuleError;
use crate::module::{require_manager, Module};

/// Add-liquidity request, in per-share units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityParams {
    pub integration: String,
    /// Pool address; also the pool token's asset address.
    pub pool: Address,
    #[serde(with = "trove_protocol::math::u128_string")]
    pub min_pool_token_unit: u128,
    pub components: Vec<Address>,
    /// Most of each component, per share, the pool may take.
    #[serde(with = "trove_protocol::math::u128_string_seq")]
    pub max_component_units: Vec<u128>,
}

/// Remove-liquidity request, in per-share units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityParams {
    pub integration: String,
    pub pool: Address,
    /// Pool tokens per share to burn.
    #[serde(with = "trove_protocol::math::u128_string")]
    pub pool_token_unit: u128,
    pub components: Vec<Address>,
    /// Least of each component, per share, to get back.
    #[serde(with = "trove_protocol::math::u128_string_seq")]
    pub min_component_units: Vec<u128>,
}

/// Basket-wide amounts moved by a liquidity operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityReceipt {
    /// Pool tokens minted (add) or burned (remove).
    pub liquidity: u128,
    /// Component amounts spent (add) or received (remove), in request order.
    pub amounts: Vec<u128>,
}

/// Manager-driven liquidity provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmModule {
    address: Address,
}

impl AmmModule {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Deposits default positions into `params.pool`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for mismatched or empty component lists, units the
    /// basket does not hold, or an empty basket; `SlippageOrReconciliation`
    /// if the pool took more than the maximum or minted fewer pool tokens
    /// than the minimum.
    pub fn add_liquidity(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        params: &AddLiquidityParams,
    ) -> Result<LiquidityReceipt, ModuleError> {
        require_manager(engine, caller, basket)?;
        check_lengths(&params.components, &params.max_component_units)?;

        engine.operate(&self.address, basket, |engine| {
            let (supply, scale) = supply_and_scale(engine, basket)?;
            {
                let target = engine.basket(basket)?;
                for (component, unit) in params.components.iter().zip(&params.max_component_units) {
                    if !target.has_sufficient_default_units(component, *unit) {
                        return Err(ModuleError::invalid(format!(
                            "basket holds less than {unit} units of {component}"
                        )));
                    }
                }
            }

            let max_amounts = params
                .max_component_units
                .iter()
                .map(|unit| precise_mul(*unit, supply, scale))
                .collect::<Result<Vec<_>, _>>()?;
            let min_liquidity = precise_mul(params.min_pool_token_unit, supply, scale)?;

            let before = self.snapshot(engine, basket, &params.components);
            let pool_before = engine.balance_of(&params.pool, basket);

            let adapter = engine.resolve(&self.address, &params.integration)?;
            let quote = engine.quote(
                adapter.as_ref(),
                basket,
                &Intent::AddLiquidity {
                    pool: params.pool.clone(),
                    components: params.components.clone(),
                    max_amounts: max_amounts.clone(),
                    min_liquidity,
                },
            )?;
            engine.invoke(&self.address, basket, &adapter, &quote.call_data)?;

            let after = self.snapshot(engine, basket, &params.components);
            let pool_after = engine.balance_of(&params.pool, basket);

            let mut spent = Vec::with_capacity(params.components.len());
            for (i, component) in params.components.iter().enumerate() {
                let amount = to_signed(before[i])? - to_signed(after[i])?;
                if amount < 0 || amount.unsigned_abs() > max_amounts[i] {
                    return Err(LedgerError::SlippageOrReconciliation {
                        asset: component.clone(),
                        expected: -to_signed(max_amounts[i])?,
                        actual: -amount,
                    }
                    .into());
                }
                spent.push(amount.unsigned_abs());
            }
            let minted = pool_after.checked_sub(pool_before).ok_or_else(|| {
                LedgerError::InvariantViolation("pool token balance fell while adding liquidity".into())
            })?;
            ensure_received(&params.pool, min_liquidity, minted)?;

            self.rewrite_default_units(engine, basket, &params.components, &before, &after, supply, scale)?;

            let held = engine.basket(basket)?.external_unit(&params.pool, &self.address);
            let added = to_signed(precise_div(minted, supply, scale)?)?;
            let unit = held
                .checked_add(added)
                .ok_or(LedgerError::ArithmeticOverflow("pool token unit"))?;
            engine.edit_external_position(
                &self.address,
                basket,
                &params.pool,
                &self.address,
                unit,
                params.integration.as_bytes().to_vec(),
            )?;

            info!(
                basket = %basket,
                pool = %params.pool,
                integration = %params.integration,
                liquidity = %minted,
                "liquidity added"
            );
            Ok(LiquidityReceipt {
                liquidity: minted,
                amounts: spent,
            })
        })
    }

    /// Withdraws liquidity previously added through this module.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the module's external pool position is smaller
    /// than the request; `SlippageOrReconciliation` if the pool burned a
    /// different amount or paid out less than the minimums.
    pub fn remove_liquidity(
        &self,
        engine: &mut Engine,
        caller: &Address,
        basket: &Address,
        params: &RemoveLiquidityParams,
    ) -> Result<LiquidityReceipt, ModuleError> {
        require_manager(engine, caller, basket)?;
        check_lengths(&params.components, &params.min_component_units)?;
        if params.pool_token_unit == 0 {
            return Err(ModuleError::invalid("pool token unit must be positive"));
        }

        engine.operate(&self.address, basket, |engine| {
            let (supply, scale) = supply_and_scale(engine, basket)?;
            let (held, data) = {
                let target = engine.basket(basket)?;
                let position = target.external_position(&params.pool, &self.address);
                (
                    position.map(|p| p.unit).unwrap_or(0),
                    position.map(|p| p.data.clone()).unwrap_or_default(),
                )
            };
            let requested = to_signed(params.pool_token_unit)?;
            if held < requested {
                return Err(ModuleError::invalid(format!(
                    "module holds {held} pool token units of {}, requested {requested}",
                    params.pool
                )));
            }

            let liquidity = precise_mul(params.pool_token_unit, supply, scale)?;
            let min_amounts = params
                .min_component_units
                .iter()
                .map(|unit| precise_mul(*unit, supply, scale))
                .collect::<Result<Vec<_>, _>>()?;

            let before = self.snapshot(engine, basket, &params.components);
            let pool_before = engine.balance_of(&params.pool, basket);

            let adapter = engine.resolve(&self.address, &params.integration)?;
            let quote = engine.quote(
                adapter.as_ref(),
                basket,
                &Intent::RemoveLiquidity {
                    pool: params.pool.clone(),
                    liquidity,
                    components: params.components.clone(),
                    min_amounts: min_amounts.clone(),
                },
            )?;
            engine.invoke(&self.address, basket, &adapter, &quote.call_data)?;

            let after = self.snapshot(engine, basket, &params.components);
            let pool_after = engine.balance_of(&params.pool, basket);

            let burned = to_signed(pool_before)? - to_signed(pool_after)?;
            reconcile(&params.pool, to_signed(liquidity)?, burned, Tolerance::Exact)?;

            let mut received = Vec::with_capacity(params.components.len());
            for (i, component) in params.components.iter().enumerate() {
                let delta = to_signed(after[i])? - to_signed(before[i])?;
                let amount = u128::try_from(delta).map_err(|_| LedgerError::SlippageOrReconciliation {
                    asset: component.clone(),
                    expected: i128::try_from(min_amounts[i]).unwrap_or(i128::MAX),
                    actual: delta,
                })?;
                ensure_received(component, min_amounts[i], amount)?;
                received.push(amount);
            }

            self.rewrite_default_units(engine, basket, &params.components, &before, &after, supply, scale)?;
            engine.edit_external_position(
                &self.address,
                basket,
                &params.pool,
                &self.address,
                held - requested,
                data,
            )?;

            info!(
                basket = %basket,
                pool = %params.pool,
                integration = %params.integration,
                liquidity = %liquidity,
                "liquidity removed"
            );
            Ok(LiquidityReceipt {
                liquidity,
                amounts: received,
            })
        })
    }

    fn snapshot(&self, engine: &Engine, basket: &Address, components: &[Address]) -> Vec<u128> {
        components
            .iter()
            .map(|component| engine.balance_of(component, basket))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_default_units(
        &self,
        engine: &mut Engine,
        basket: &Address,
        components: &[Address],
        before: &[u128],
        after: &[u128],
        supply: u128,
        scale: u128,
    ) -> Result<(), LedgerError> {
        for (i, component) in components.iter().enumerate() {
            let previous = engine.basket(basket)?.default_unit(component);
            let unit = default_unit_after_change(supply, before[i], after[i], previous, scale)?;
            engine.edit_default_position(&self.address, basket, component, unit)?;
        }
        Ok(())
    }
}

impl Module for AmmModule {
    fn address(&self) -> &Address {
        &self.address
    }

    fn name(&self) -> &'static str {
        "amm"
    }
}

fn check_lengths(components: &[Address], units: &[u128]) -> Result<(), ModuleError> {
    if components.is_empty() || components.len() != units.len() {
        return Err(ModuleError::invalid(format!(
            "{} components but {} units",
            components.len(),
            units.len()
        )));
    }
    Ok(())
}

fn supply_and_scale(engine: &Engine, basket: &Address) -> Result<(u128, u128), ModuleError> {
    let target = engine.basket(basket)?;
    if target.total_supply() == 0 {
        return Err(ModuleError::invalid("basket has no supply"));
    }
    Ok((target.total_supply(), target.unit_scale()))
}
