//! # Module Lifecycle Contract
//!
//! Every module is a stateless identity: all of its state lives in the
//! engine (its basket authorization, its external positions, its own token
//! custody), so a failed operation rolls a module back along with
//! everything else.
//!
//! Attaching a module to a basket is a two-step handshake. The manager adds
//! it (pending) through the kernel, then triggers the module's
//! [`initialize`](Module::initialize), which is where a module would also set
//! up any per-basket configuration of its own.

use tracing::info;
use trove_protocol::{Address, Engine};

use crate::error::ModuleError;

/// Shared lifecycle of every basket module.
pub trait Module {
    /// The module's identity in the registry.
    fn address(&self) -> &Address;

    /// Human-readable module name, for logs.
    fn name(&self) -> &'static str;

    /// Completes the module's initialization on `basket`.
    ///
    /// Only the basket's manager may trigger this.
    ///
    /// # Errors
    ///
    /// [`ModuleError::NotManager`], or whatever the kernel's
    /// `initialize_module` refuses with (`NotPending`, `BasketNotEnabled`,
    /// `NotAModule`).
    fn initialize(&self, engine: &mut Engine, caller: &Address, basket: &Address) -> Result<(), ModuleError> {
        require_manager(engine, caller, basket)?;
        engine.initialize_module(self.address(), basket)?;
        info!(module = self.name(), basket = %basket, "module initialized on basket");
        Ok(())
    }

    /// Detaches the module from `basket` on the manager's request.
    ///
    /// # Errors
    ///
    /// [`ModuleError::NotManager`], or `OutstandingPositions` while the
    /// module still owns an external position there.
    fn remove(&self, engine: &mut Engine, caller: &Address, basket: &Address) -> Result<(), ModuleError> {
        require_manager(engine, caller, basket)?;
        engine.remove_module_from_basket(self.address(), basket, self.address())?;
        info!(module = self.name(), basket = %basket, "module removed from basket");
        Ok(())
    }
}

/// Fails unless `caller` manages `basket`.
pub fn require_manager(engine: &Engine, caller: &Address, basket: &Address) -> Result<(), ModuleError> {
    if engine.basket(basket)?.manager() != caller {
        return Err(ModuleError::NotManager {
            caller: caller.clone(),
            basket: basket.clone(),
        });
    }
    Ok(())
}
