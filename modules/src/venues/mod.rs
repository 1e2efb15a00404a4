//! # Reference Venues
//!
//! Two self-contained [`Adapter`](trove_protocol::Adapter) implementations
//! used by the node's genesis and the integration tests:
//!
//! | Venue | Intents | Pricing |
//! |-------|---------|---------|
//! | [`ConstantProductVenue`] | swap, add/remove liquidity | `x * y = k` with a fee |
//! | [`FixedRateVenue`] | swap | configured rate per pair |
//!
//! Neither holds any balances itself. Reserves are ordinary token balances
//! of the pool (or reserve) address in the engine's token ledger, so a
//! rolled-back operation rolls the venue back too.

mod constant_product;
mod fixed_rate;

pub use constant_product::{ConstantProductVenue, PoolConfig};
pub use fixed_rate::{FixedRateVenue, RateConfig};

use std::fmt;

use trove_protocol::adapter::Invocation;
use trove_protocol::{Address, Engine, LedgerError};

/// Venue-side refusals. Surfaced to modules as
/// [`LedgerError::AdapterFailure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    UnknownPool(Address),

    UnsupportedPair { source: Address, destination: Address },

    UnsupportedIntent(&'static str),

    ComponentMismatch { pool: Address, expected: [Address; 2] },

    InsufficientLiquidity(Address),

    InsufficientOutput { minimum: u128, actual: u128 },

    InvalidFee(u32),

    ZeroAmount,
}

// Hand-written rather than derived: thiserror treats a field named `source`
// as the error's cause, which `UnsupportedPair` is not.
impl fmt::Display for VenueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueError::UnknownPool(pool) => write!(f, "venue has no pool {pool}"),
            VenueError::UnsupportedPair { source, destination } => {
                write!(f, "venue does not trade {source} -> {destination}")
            }
            VenueError::UnsupportedIntent(intent) => write!(f, "venue does not support {intent}"),
            VenueError::ComponentMismatch { pool, expected } => {
                write!(f, "pool {pool} expects components {expected:?}")
            }
            VenueError::InsufficientLiquidity(pool) => write!(f, "insufficient liquidity in {pool}"),
            VenueError::InsufficientOutput { minimum, actual } => {
                write!(f, "output {actual} below minimum {minimum}")
            }
            VenueError::InvalidFee(bps) => write!(f, "fee of {bps} bps is not below 10000"),
            VenueError::ZeroAmount => write!(f, "zero amount"),
        }
    }
}

impl std::error::Error for VenueError {}

impl From<VenueError> for LedgerError {
    fn from(err: VenueError) -> Self {
        LedgerError::AdapterFailure(err.to_string())
    }
}

/// Read access to balances, shared by quoting (against the engine) and
/// execution (against an invocation).
pub(crate) trait ReserveView {
    fn balance(&self, asset: &Address, holder: &Address) -> u128;
    fn supply(&self, asset: &Address) -> u128;
}

impl ReserveView for Engine {
    fn balance(&self, asset: &Address, holder: &Address) -> u128 {
        self.balance_of(asset, holder)
    }

    fn supply(&self, asset: &Address) -> u128 {
        self.tokens().total_supply(asset)
    }
}

impl ReserveView for Invocation<'_> {
    fn balance(&self, asset: &Address, holder: &Address) -> u128 {
        self.balance_of(asset, holder)
    }

    fn supply(&self, asset: &Address) -> u128 {
        self.total_supply(asset)
    }
}
