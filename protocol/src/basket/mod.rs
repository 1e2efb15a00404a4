//! # Basket Ledger
//!
//! A basket is a tokenized claim on a set of components. Ownership is kept
//! *per share*: each component carries a unit, and the basket's real holding
//! of that component is
//!
//! ```text
//! real_holding(c) = total_supply * (default_unit(c) + Σ external_unit(c, m)) / unit_scale
//! ```
//!
//! Minting and burning shares never touch units, so every holder's
//! proportional claim is preserved automatically as supply changes.
//!
//! - **Default positions** are tokens the basket holds directly.
//! - **External positions** are tokens deployed elsewhere by one module (LP
//!   tokens, collateral). Only the owning module may edit its own entry.
//!
//! The basket itself does no authorization beyond the lifecycle rules in
//! [`lifecycle`]; the [`Engine`](crate::engine::Engine) checks who is calling
//! before it reaches any mutator here.

pub mod lifecycle;
pub mod positions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::types::{Address, ModuleState};

pub use positions::{ComponentChange, ExternalPosition, Position, PositionKind};

/// Creation parameters shared by the factory and direct deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketRequest {
    /// Initial components, in order.
    pub components: Vec<Address>,
    /// Initial default unit of each component. Must be positive.
    #[serde(with = "crate::math::i128_string_seq")]
    pub units: Vec<i128>,
    /// Modules to attach as `Pending`.
    pub modules: Vec<Address>,
    /// Per-component purchase weights. Empty, or one per component.
    #[serde(default)]
    pub share_split: Vec<u32>,
    /// Owner of the basket.
    pub manager: Address,
    /// Display name.
    pub name: String,
    /// Ticker.
    pub symbol: String,
}

/// One basket's complete ledger state.
#[derive(Debug, Clone)]
pub struct Basket {
    address: Address,
    name: String,
    symbol: String,
    manager: Address,
    unit_scale: u128,
    max_components: usize,
    share_split: Vec<u32>,
    created_at: DateTime<Utc>,

    total_supply: u128,
    balances: BTreeMap<Address, u128>,

    components: Vec<Address>,
    default_positions: BTreeMap<Address, i128>,
    external_positions: BTreeMap<Address, BTreeMap<Address, ExternalPosition>>,

    module_states: BTreeMap<Address, ModuleState>,
    locker: Option<Address>,
}

impl Basket {
    /// An empty basket with no components, modules or supply.
    pub(crate) fn new(
        address: Address,
        name: String,
        symbol: String,
        manager: Address,
        unit_scale: u128,
        max_components: usize,
        share_split: Vec<u32>,
    ) -> Self {
        Self {
            address,
            name,
            symbol,
            manager,
            unit_scale,
            max_components,
            share_split,
            created_at: Utc::now(),
            total_supply: 0,
            balances: BTreeMap::new(),
            components: Vec::new(),
            default_positions: BTreeMap::new(),
            external_positions: BTreeMap::new(),
            module_states: BTreeMap::new(),
            locker: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn manager(&self) -> &Address {
        &self.manager
    }

    /// Fixed-point denominator of this basket's units.
    pub fn unit_scale(&self) -> u128 {
        self.unit_scale
    }

    pub fn max_components(&self) -> usize {
        self.max_components
    }

    /// Purchase weights, aligned with the components the basket was created
    /// with.
    pub fn share_split(&self) -> &[u32] {
        &self.share_split
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // -----------------------------------------------------------------------
    // Shares
    // -----------------------------------------------------------------------

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Shares held by `holder`.
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Every holder with a non-zero balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, u128)> {
        self.balances.iter().map(|(holder, amount)| (holder, *amount))
    }

    /// Issues `amount` new shares to `holder`. Units are untouched.
    pub(crate) fn mint(&mut self, holder: &Address, amount: u128) -> Result<(), LedgerError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("basket supply"))?;
        let balance = self
            .balance_of(holder)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("share balance"))?;
        self.total_supply = supply;
        if balance > 0 {
            self.balances.insert(holder.clone(), balance);
        }
        Ok(())
    }

    /// Destroys `amount` of `holder`'s shares. Units are untouched.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if `holder` owns fewer shares.
    pub(crate) fn burn(&mut self, holder: &Address, amount: u128) -> Result<(), LedgerError> {
        let available = self.balance_of(holder);
        let balance = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                asset: self.address.clone(),
                account: holder.clone(),
                available,
                requested: amount,
            })?;
        // Balances sum to supply, so this cannot underflow unless the
        // ledger is already corrupt.
        self.total_supply = self.total_supply.checked_sub(amount).ok_or_else(|| {
            LedgerError::InvariantViolation("share balances exceed total supply".into())
        })?;
        if balance == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.clone(), balance);
        }
        Ok(())
    }

    /// Moves shares between holders.
    pub(crate) fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.burn(from, amount)?;
        self.mint(to, amount)
    }
}
