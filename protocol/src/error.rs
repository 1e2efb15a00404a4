//! # Ledger Errors
//!
//! Every kernel operation that can fail returns a [`LedgerError`]. Errors
//! are never swallowed or retried inside the kernel: the enclosing top-level
//! operation aborts and the [`Engine`](crate::engine::Engine) restores the
//! pre-operation state. Callers get a specific kind so they can decide
//! whether to retry with different parameters or give up.

use thiserror::Error;

use crate::types::{Address, ModuleState, ResourceId};

/// Errors produced by the registry, the adapter directory, the basket
/// ledger and the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The caller lacks the role or state the action requires.
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized {
        /// Identity that attempted the action.
        caller: Address,
        /// Short description of what was attempted.
        action: String,
    },

    /// No endpoint is registered under this resource id.
    #[error("unknown resource id {0}")]
    UnknownResource(ResourceId),

    /// A resource with this id is already registered.
    #[error("resource id {0} is already bound")]
    DuplicateResourceId(ResourceId),

    /// The adapter directory has no binding for `(module, name)`.
    #[error("unknown integration '{name}' for module {module}")]
    UnknownIntegration {
        /// Module the lookup was made for.
        module: Address,
        /// Integration name that was looked up.
        name: String,
    },

    /// The caller is not an initialized module of the basket.
    #[error("module {module} is not initialized on basket {basket}")]
    ModuleNotInitialized {
        /// Module that attempted the call.
        module: Address,
        /// Basket it attempted to mutate.
        basket: Address,
    },

    /// The module is already attached (pending or initialized).
    #[error("module {module} is already attached to the basket ({state})")]
    AlreadyPending {
        /// Module the manager tried to add.
        module: Address,
        /// Its current state on the basket.
        state: ModuleState,
    },

    /// `initialize` was called by a module that is not pending.
    #[error("module {module} is not pending initialization ({state})")]
    NotPending {
        /// Module that tried to initialize.
        module: Address,
        /// Its current state on the basket.
        state: ModuleState,
    },

    /// The identity is not an approved module in the registry.
    #[error("{0} is not a registered module")]
    NotAModule(Address),

    /// The identity is not an approved factory in the registry.
    #[error("{0} is not a registered factory")]
    NotAFactory(Address),

    /// The basket was not created through an approved factory (or has been
    /// disabled), so no module may initialize on it.
    #[error("basket {0} is not enabled in the registry")]
    BasketNotEnabled(Address),

    /// No basket exists at this address.
    #[error("unknown basket {0}")]
    UnknownBasket(Address),

    /// The module still owns a non-zero external position.
    #[error("module {module} still holds an external position in {component}")]
    OutstandingPositions {
        /// Module whose removal was attempted.
        module: Address,
        /// First component with an outstanding position.
        component: Address,
    },

    /// A mutation was attempted while another operation holds the basket.
    #[error("reentrant call on basket {basket} (locked by {locker})")]
    ReentrantCall {
        /// The basket being re-entered.
        basket: Address,
        /// Module whose operation is in flight.
        locker: Address,
    },

    /// Measured token movement diverged from the expected ledger delta
    /// beyond the caller's tolerance.
    #[error("reconciliation failed for {asset}: expected {expected}, actual {actual}")]
    SlippageOrReconciliation {
        /// Asset whose movement diverged.
        asset: Address,
        /// Expected signed amount (positive = into the account).
        expected: i128,
        /// Measured signed amount.
        actual: i128,
    },

    /// An internal consistency check failed. Always a bug, never bad input.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The account does not hold enough of the asset.
    #[error("insufficient balance of {asset} for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Asset being moved (or basket shares being burned).
        asset: Address,
        /// Account being debited.
        account: Address,
        /// Current balance.
        available: u128,
        /// Amount requested.
        requested: u128,
    },

    /// The spender's allowance does not cover the transfer.
    #[error("insufficient allowance of {asset}: {spender} may move {allowance} from {owner}, requested {requested}")]
    InsufficientAllowance {
        /// Asset being moved.
        asset: Address,
        /// Account whose funds are moved.
        owner: Address,
        /// Account moving them.
        spender: Address,
        /// Remaining allowance.
        allowance: u128,
        /// Amount requested.
        requested: u128,
    },

    /// A checked arithmetic operation overflowed.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// The request is malformed (length mismatch, zero quantity, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An external adapter rejected or failed the call.
    #[error("adapter failure: {0}")]
    AdapterFailure(String),
}

impl LedgerError {
    /// Stable, machine-readable name of the error kind.
    ///
    /// Used by the node's JSON-RPC layer so clients can branch on the kind
    /// without parsing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "Unauthorized",
            LedgerError::UnknownResource(_) => "UnknownResource",
            LedgerError::DuplicateResourceId(_) => "DuplicateResourceId",
            LedgerError::UnknownIntegration { .. } => "UnknownIntegration",
            LedgerError::ModuleNotInitialized { .. } => "ModuleNotInitialized",
            LedgerError::AlreadyPending { .. } => "AlreadyPending",
            LedgerError::NotPending { .. } => "NotPending",
            LedgerError::NotAModule(_) => "NotAModule",
            LedgerError::NotAFactory(_) => "NotAFactory",
            LedgerError::BasketNotEnabled(_) => "BasketNotEnabled",
            LedgerError::UnknownBasket(_) => "UnknownBasket",
            LedgerError::OutstandingPositions { .. } => "OutstandingPositions",
            LedgerError::ReentrantCall { .. } => "ReentrantCall",
            LedgerError::SlippageOrReconciliation { .. } => "SlippageOrReconciliation",
            LedgerError::InvariantViolation(_) => "InvariantViolation",
            LedgerError::InsufficientBalance { .. } => "InsufficientBalance",
            LedgerError::InsufficientAllowance { .. } => "InsufficientAllowance",
            LedgerError::ArithmeticOverflow(_) => "ArithmeticOverflow",
            LedgerError::InvalidArgument(_) => "InvalidArgument",
            LedgerError::AdapterFailure(_) => "AdapterFailure",
        }
    }

    /// Shorthand for [`LedgerError::Unauthorized`].
    pub(crate) fn unauthorized(caller: &Address, action: impl Into<String>) -> Self {
        LedgerError::Unauthorized {
            caller: caller.clone(),
            action: action.into(),
        }
    }
}
