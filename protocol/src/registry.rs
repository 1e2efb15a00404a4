//! # Registry
//!
//! Process-wide whitelist. A single admin decides which identities are
//! approved modules and factories, which endpoint answers each numbered
//! resource, and which baskets are enabled (created through an approved
//! factory and not since disabled).
//!
//! Approval is binary and checked on every call, so removing a module takes
//! effect immediately on every basket it was attached to.
//!
//! Every mutator validates first and applies second; a failed call leaves
//! the registry untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::error::LedgerError;
use crate::types::{Address, ResourceId};

/// Approved modules, factories, resources and baskets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    admin: Address,
    modules: BTreeSet<Address>,
    factories: BTreeSet<Address>,
    resources: BTreeMap<ResourceId, Address>,
    baskets: BTreeSet<Address>,
}

impl Registry {
    /// Creates an empty registry governed by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            modules: BTreeSet::new(),
            factories: BTreeSet::new(),
            resources: BTreeMap::new(),
            baskets: BTreeSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The identity allowed to mutate the registry.
    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Whether `id` is an approved module.
    pub fn is_module(&self, id: &Address) -> bool {
        self.modules.contains(id)
    }

    /// Whether `id` is an approved factory.
    pub fn is_factory(&self, id: &Address) -> bool {
        self.factories.contains(id)
    }

    /// Whether `basket` was registered by an approved factory and is still
    /// enabled.
    pub fn is_basket(&self, basket: &Address) -> bool {
        self.baskets.contains(basket)
    }

    /// Endpoint registered under `id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownResource`] if nothing is registered there.
    pub fn get_resource(&self, id: ResourceId) -> Result<&Address, LedgerError> {
        self.resources.get(&id).ok_or(LedgerError::UnknownResource(id))
    }

    /// Approved modules, sorted.
    pub fn modules(&self) -> impl Iterator<Item = &Address> {
        self.modules.iter()
    }

    /// Approved factories, sorted.
    pub fn factories(&self) -> impl Iterator<Item = &Address> {
        self.factories.iter()
    }

    /// Registered resources by id.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Address)> {
        self.resources.iter().map(|(id, endpoint)| (*id, endpoint))
    }

    /// Enabled baskets, sorted.
    pub fn baskets(&self) -> impl Iterator<Item = &Address> {
        self.baskets.iter()
    }

    // -----------------------------------------------------------------------
    // Admin mutators
    // -----------------------------------------------------------------------

    /// Approves `module`. Approving an approved module is a no-op.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin.
    pub fn add_module(&mut self, caller: &Address, module: Address) -> Result<(), LedgerError> {
        self.require_admin(caller, "add modules")?;
        if self.modules.insert(module.clone()) {
            info!(module = %module, "module approved");
        }
        Ok(())
    }

    /// Revokes `module`. Baskets keep their state entry for it, but every
    /// call it makes fails from now on.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin;
    /// [`LedgerError::NotAModule`] if `module` was never approved.
    pub fn remove_module(&mut self, caller: &Address, module: &Address) -> Result<(), LedgerError> {
        self.require_admin(caller, "remove modules")?;
        if !self.modules.remove(module) {
            return Err(LedgerError::NotAModule(module.clone()));
        }
        info!(module = %module, "module revoked");
        Ok(())
    }

    /// Approves `factory`. Approving an approved factory is a no-op.
    pub fn add_factory(&mut self, caller: &Address, factory: Address) -> Result<(), LedgerError> {
        self.require_admin(caller, "add factories")?;
        if self.factories.insert(factory.clone()) {
            info!(factory = %factory, "factory approved");
        }
        Ok(())
    }

    /// Revokes `factory`. Baskets it already created stay enabled.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAFactory`] if `factory` was never approved.
    pub fn remove_factory(&mut self, caller: &Address, factory: &Address) -> Result<(), LedgerError> {
        self.require_admin(caller, "remove factories")?;
        if !self.factories.remove(factory) {
            return Err(LedgerError::NotAFactory(factory.clone()));
        }
        info!(factory = %factory, "factory revoked");
        Ok(())
    }

    /// Registers `endpoint` under resource `id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateResourceId`] if `id` is taken. Remove it
    /// first to rebind.
    pub fn add_resource(
        &mut self,
        caller: &Address,
        id: ResourceId,
        endpoint: Address,
    ) -> Result<(), LedgerError> {
        self.require_admin(caller, "add resources")?;
        if self.resources.contains_key(&id) {
            return Err(LedgerError::DuplicateResourceId(id));
        }
        info!(id, endpoint = %endpoint, "resource registered");
        self.resources.insert(id, endpoint);
        Ok(())
    }

    /// Unregisters resource `id`, returning its endpoint.
    pub fn remove_resource(&mut self, caller: &Address, id: ResourceId) -> Result<Address, LedgerError> {
        self.require_admin(caller, "remove resources")?;
        let endpoint = self
            .resources
            .remove(&id)
            .ok_or(LedgerError::UnknownResource(id))?;
        info!(id, "resource removed");
        Ok(endpoint)
    }

    /// Disables `basket`: modules can no longer initialize on it. Modules
    /// already initialized keep working.
    pub fn disable_basket(&mut self, caller: &Address, basket: &Address) -> Result<(), LedgerError> {
        self.require_admin(caller, "disable baskets")?;
        if !self.baskets.remove(basket) {
            return Err(LedgerError::BasketNotEnabled(basket.clone()));
        }
        info!(basket = %basket, "basket disabled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Factory mutators
    // -----------------------------------------------------------------------

    /// Enables a basket. Only approved factories may do this, right after
    /// creating it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAFactory`] if `factory` is not approved.
    pub fn register_basket(&mut self, factory: &Address, basket: Address) -> Result<(), LedgerError> {
        if !self.is_factory(factory) {
            return Err(LedgerError::NotAFactory(factory.clone()));
        }
        self.baskets.insert(basket);
        Ok(())
    }

    fn require_admin(&self, caller: &Address, action: &str) -> Result<(), LedgerError> {
        if caller != &self.admin {
            return Err(LedgerError::unauthorized(caller, action));
        }
        Ok(())
    }
}
