//! Module authorization and the reentrancy lock.
//!
//! ```text
//!   None ──add──► Pending ──initialize──► Initialized ──remove──► None
//!                    │
//!                    └──────cancel (manager)──────────────────────► None
//! ```
//!
//! `None` is never stored; it is the absence of an entry.

use super::Basket;
use crate::error::LedgerError;
use crate::types::{Address, ModuleState};

impl Basket {
    /// State of `module` on this basket.
    pub fn module_state(&self, module: &Address) -> ModuleState {
        self.module_states
            .get(module)
            .copied()
            .unwrap_or(ModuleState::None)
    }

    /// Whether `module` may call mutation primitives.
    pub fn is_initialized_module(&self, module: &Address) -> bool {
        self.module_state(module) == ModuleState::Initialized
    }

    /// Every attached module with its state, sorted by address.
    pub fn modules(&self) -> impl Iterator<Item = (&Address, ModuleState)> {
        self.module_states.iter().map(|(module, state)| (module, *state))
    }

    /// Module whose operation currently holds the basket.
    pub fn locker(&self) -> Option<&Address> {
        self.locker.as_ref()
    }

    /// Fails unless `caller` is the manager.
    pub(crate) fn require_manager(&self, caller: &Address, action: &str) -> Result<(), LedgerError> {
        if caller != &self.manager {
            return Err(LedgerError::unauthorized(caller, action));
        }
        Ok(())
    }

    /// Fails if an operation of someone other than `caller` is in flight.
    pub(crate) fn ensure_not_locked_by_other(&self, caller: &Address) -> Result<(), LedgerError> {
        match &self.locker {
            Some(locker) if locker != caller => Err(LedgerError::ReentrantCall {
                basket: self.address.clone(),
                locker: locker.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// `None -> Pending`.
    pub(crate) fn begin_pending(&mut self, module: &Address) -> Result<(), LedgerError> {
        let state = self.module_state(module);
        if state != ModuleState::None {
            return Err(LedgerError::AlreadyPending {
                module: module.clone(),
                state,
            });
        }
        self.module_states.insert(module.clone(), ModuleState::Pending);
        Ok(())
    }

    /// `Pending -> Initialized`.
    pub(crate) fn complete_initialization(&mut self, module: &Address) -> Result<(), LedgerError> {
        self.require_pending(module)?;
        self.module_states
            .insert(module.clone(), ModuleState::Initialized);
        Ok(())
    }

    /// `Pending -> None`, the manager's way out of a module that never
    /// initialized.
    pub(crate) fn cancel_pending(&mut self, module: &Address) -> Result<(), LedgerError> {
        self.require_pending(module)?;
        self.module_states.remove(module);
        Ok(())
    }

    /// `Initialized -> None`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ModuleNotInitialized`] if the module is not live;
    /// [`LedgerError::OutstandingPositions`] while it still owns a non-zero
    /// external position anywhere in the basket.
    pub(crate) fn detach_module(&mut self, module: &Address) -> Result<(), LedgerError> {
        if !self.is_initialized_module(module) {
            return Err(LedgerError::ModuleNotInitialized {
                module: module.clone(),
                basket: self.address.clone(),
            });
        }
        if let Some(component) = self.outstanding_position_of(module) {
            return Err(LedgerError::OutstandingPositions {
                module: module.clone(),
                component: component.clone(),
            });
        }
        self.module_states.remove(module);
        Ok(())
    }

    /// Takes the basket for `module`'s operation.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ReentrantCall`] if any operation, including one of
    /// `module`'s own, already holds it.
    pub(crate) fn acquire_lock(&mut self, module: &Address) -> Result<(), LedgerError> {
        if let Some(locker) = &self.locker {
            return Err(LedgerError::ReentrantCall {
                basket: self.address.clone(),
                locker: locker.clone(),
            });
        }
        self.locker = Some(module.clone());
        Ok(())
    }

    pub(crate) fn release_lock(&mut self) {
        self.locker = None;
    }

    pub(crate) fn set_manager(&mut self, manager: Address) {
        self.manager = manager;
    }

    fn require_pending(&self, module: &Address) -> Result<(), LedgerError> {
        let state = self.module_state(module);
        if state != ModuleState::Pending {
            return Err(LedgerError::NotPending {
                module: module.clone(),
                state,
            });
        }
        Ok(())
    }
}
