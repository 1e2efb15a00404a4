//! Errors returned by module entry points.

use thiserror::Error;
use trove_protocol::{Address, LedgerError};

/// Anything a module entry point can fail with.
///
/// Kernel refusals pass through unchanged so callers can still branch on the
/// specific [`LedgerError`] kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// The kernel refused an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The entry point is reserved for the basket's manager.
    #[error("{caller} is not the manager of basket {basket}")]
    NotManager {
        /// Identity that attempted the call.
        caller: Address,
        /// Basket it targeted.
        basket: Address,
    },
}

impl ModuleError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleError::Ledger(inner) => inner.kind(),
            ModuleError::NotManager { .. } => "NotManager",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ModuleError::Ledger(LedgerError::InvalidArgument(message.into()))
    }
}
