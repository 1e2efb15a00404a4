//! # Shared Ledger Types
//!
//! Identities and small value types used by every other module. Nothing in
//! here knows about authorization or positions; it's vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Identity of any account the ledger knows about: holders, managers,
/// modules, factories, baskets, assets, and venue pools.
///
/// Addresses are opaque, case-sensitive strings. The ledger never parses
/// them; it only compares them. Baskets created by a factory get a
/// deterministic `0x`-prefixed hex address, everything else is whatever the
/// host chose to call it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives a basket address from the deploying factory and its nonce.
    ///
    /// `0x` followed by the first 20 bytes of `BLAKE3(factory || nonce_be)`,
    /// hex-encoded. Two factories never collide unless BLAKE3 does.
    pub fn derive(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(deployer.as_str().as_bytes());
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..20])))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Module State
// ---------------------------------------------------------------------------

/// Authorization state of one module on one basket.
///
/// The only legal walk is `None -> Pending -> Initialized -> None`, plus the
/// manager's escape hatch `Pending -> None`. A basket never stores `None`;
/// absence from its state map is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// Not attached to the basket.
    None,
    /// Added by the manager, waiting for the module to initialize itself.
    Pending,
    /// Live: may call mutation primitives on the basket.
    Initialized,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::None => write!(f, "None"),
            ModuleState::Pending => write!(f, "Pending"),
            ModuleState::Initialized => write!(f, "Initialized"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource Ids
// ---------------------------------------------------------------------------

/// Numeric key of a named registry resource (integration registry, oracle,
/// fee calculator, ...). See the `RESOURCE_*` constants in [`crate::config`].
pub type ResourceId = u32;
