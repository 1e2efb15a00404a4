//! # Ledger Configuration & Constants
//!
//! Every magic number in Trove lives here. If you're hardcoding a constant
//! somewhere else, move it here.
//!
//! Constants describe the protocol itself. [`LedgerConfig`] holds the few
//! knobs a host may tune at genesis; it deserializes from the node's TOML
//! genesis file with every field defaulted.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Ledger protocol version, reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Fixed-Point Parameters
// ---------------------------------------------------------------------------

/// One whole unit in 18-decimal fixed point. Position units are expressed
/// per share with this denominator unless a basket was created with a
/// different scale.
pub const PRECISE_UNIT: u128 = 1_000_000_000_000_000_000;

/// Denominator for basis-point quantities (fees, tolerances).
pub const BPS_DENOMINATOR: u128 = 10_000;

// ---------------------------------------------------------------------------
// Registry Resource Ids
// ---------------------------------------------------------------------------

/// Resource id of the integration registry (the adapter directory endpoint).
pub const RESOURCE_INTEGRATION_REGISTRY: u32 = 0;

/// Resource id of the price oracle.
pub const RESOURCE_PRICE_ORACLE: u32 = 1;

/// Resource id of the fee calculator.
pub const RESOURCE_FEE_CALCULATOR: u32 = 2;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Upper bound on the number of components in a single basket. Every
/// issuance and redemption iterates the component list, so it stays small.
pub const MAX_COMPONENTS: usize = 64;

/// Ledger events kept in memory by default. Older records are pruned.
pub const DEFAULT_EVENT_RETENTION: usize = 100_000;

/// Maximum length of an integration name in bytes.
pub const MAX_INTEGRATION_NAME_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port of the node's REST/JSON-RPC API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port of the node's Prometheus endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Host-tunable ledger parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Fixed-point denominator given to newly created baskets.
    ///
    /// Real holding = `total_supply * unit / unit_scale`. A scale of `1`
    /// makes units plain "tokens per smallest share".
    #[serde(with = "crate::math::u128_string")]
    pub unit_scale: u128,

    /// Maximum components per basket, capped at [`MAX_COMPONENTS`].
    pub max_components: usize,

    /// Number of most recent events the log holds; `0` keeps all of them.
    pub event_retention: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            unit_scale: PRECISE_UNIT,
            max_components: MAX_COMPONENTS,
            event_retention: DEFAULT_EVENT_RETENTION,
        }
    }
}

impl LedgerConfig {
    /// Config with a custom unit scale and default limits.
    pub fn with_unit_scale(unit_scale: u128) -> Self {
        Self {
            unit_scale,
            ..Self::default()
        }
    }

    /// Returns a description of the first invalid field, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.unit_scale == 0 {
            return Err("unit_scale must be non-zero".into());
        }
        if self.max_components == 0 || self.max_components > MAX_COMPONENTS {
            return Err(format!(
                "max_components must be in 1..={}, got {}",
                MAX_COMPONENTS, self.max_components
            ));
        }
        Ok(())
    }
}
