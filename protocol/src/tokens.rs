//! # Token Custody
//!
//! The host's view of fungible assets: who holds how much of what, who may
//! spend on whose behalf, and how much of each asset exists. Baskets,
//! holders, modules and venue pools are all plain accounts here.
//!
//! The basket ledger never reads these balances to decide ownership; that
//! is what positions are for. Modules read them to *reconcile*: the measured
//! change in a basket's custody must match the position update they make.
//!
//! All amounts are `u128` in the asset's smallest unit. Every credit is
//! checked for overflow, every debit for sufficiency.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::types::Address;

/// Balances, allowances and supplies for every asset the host knows.
///
/// `BTreeMap` everywhere so iteration (and therefore serialized output and
/// API listings) is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    /// `asset -> (holder -> balance)`.
    balances: BTreeMap<Address, BTreeMap<Address, u128>>,
    /// `asset -> ((owner, spender) -> remaining allowance)`.
    allowances: BTreeMap<Address, BTreeMap<(Address, Address), u128>>,
    /// `asset -> total amount in existence`.
    supplies: BTreeMap<Address, u128>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `asset`, or 0.
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
        self.balances
            .get(asset)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero balances of `holder`, ordered by asset.
    pub fn holdings_of(&self, holder: &Address) -> Vec<(Address, u128)> {
        self.balances
            .iter()
            .filter_map(|(asset, holders)| {
                holders
                    .get(holder)
                    .filter(|amount| **amount > 0)
                    .map(|amount| (asset.clone(), *amount))
            })
            .collect()
    }

    /// Total amount of `asset` in existence.
    pub fn total_supply(&self, asset: &Address) -> u128 {
        self.supplies.get(asset).copied().unwrap_or(0)
    }

    /// Remaining amount `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, asset: &Address, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(asset)
            .and_then(|entries| entries.get(&(owner.clone(), spender.clone())))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct assets ever minted.
    pub fn asset_count(&self) -> usize {
        self.supplies.len()
    }

    /// Creates `amount` of `asset` in `to`'s balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ArithmeticOverflow`] if the supply or balance would
    /// exceed `u128::MAX`.
    pub fn mint(&mut self, asset: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        let supply = self
            .total_supply(asset)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("asset supply"))?;
        let balance = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("asset balance"))?;

        self.supplies.insert(asset.clone(), supply);
        self.set_balance(asset, to, balance);
        Ok(())
    }

    /// Destroys `amount` of `asset` from `from`'s balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if `from` holds less.
    pub fn burn(&mut self, asset: &Address, from: &Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.debit_amount(asset, from, amount)?;
        let supply = self.total_supply(asset).checked_sub(amount).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("supply of {asset} below a holder balance"))
        })?;

        self.set_balance(asset, from, balance);
        self.supplies.insert(asset.clone(), supply);
        Ok(())
    }

    /// Moves `amount` of `asset` from `from` to `to`.
    ///
    /// A zero amount is a no-op. Moving to oneself checks the balance and
    /// changes nothing.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] or
    /// [`LedgerError::ArithmeticOverflow`]. On error nothing changes.
    pub fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let from_balance = self.debit_amount(asset, from, amount)?;
        if amount == 0 || from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("asset balance"))?;

        self.set_balance(asset, from, from_balance);
        self.set_balance(asset, to, to_balance);
        Ok(())
    }

    /// Sets the amount `spender` may move out of `owner`'s balance.
    pub fn approve(&mut self, asset: &Address, owner: &Address, spender: &Address, amount: u128) {
        let entries = self.allowances.entry(asset.clone()).or_default();
        if amount == 0 {
            entries.remove(&(owner.clone(), spender.clone()));
        } else {
            entries.insert((owner.clone(), spender.clone()), amount);
        }
    }

    /// Moves `amount` from `owner` to `to` on `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientAllowance`] when the allowance is short;
    /// otherwise the same as [`transfer`](Self::transfer).
    pub fn transfer_from(
        &mut self,
        asset: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(asset, owner, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                asset: asset.clone(),
                owner: owner.clone(),
                spender: spender.clone(),
                allowance,
                requested: amount,
            });
        }
        self.transfer(asset, owner, to, amount)?;
        self.approve(asset, owner, spender, allowance - amount);
        Ok(())
    }

    fn debit_amount(&self, asset: &Address, from: &Address, amount: u128) -> Result<u128, LedgerError> {
        let available = self.balance_of(asset, from);
        available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                asset: asset.clone(),
                account: from.clone(),
                available,
                requested: amount,
            })
    }

    fn set_balance(&mut self, asset: &Address, holder: &Address, amount: u128) {
        let holders = self.balances.entry(asset.clone()).or_default();
        if amount == 0 {
            holders.remove(holder);
        } else {
            holders.insert(holder.clone(), amount);
        }
    }
}
