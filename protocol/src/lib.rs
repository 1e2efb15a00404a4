// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Trove Protocol: Core Ledger
//!
//! The kernel of Trove, a basket-token accounting engine. A manager composes
//! a basket of underlying assets; every holder of the basket's shares owns a
//! proportional slice of whatever the basket holds, however its composition
//! changes. Business logic (issuance, trading, liquidity provision) lives in
//! privileged modules; this crate decides who those modules are, what they
//! may touch, and keeps the numbers straight while they touch it.
//!
//! ## Architecture
//!
//! - **registry**: Whitelist of modules, factories, resources and enabled
//!   baskets. One admin, binary approval, no appeals.
//! - **directory**: `(module, integration name) -> adapter`. How a generic
//!   module finds a venue without knowing anything about it.
//! - **adapter**: The adapter trait, intents, quotes, call data, and the
//!   reconciliation helpers modules use to check what actually moved.
//! - **basket**: Positions at unit granularity, share supply, module
//!   authorization and the reentrancy lock.
//! - **factory**: The only way to create a basket modules can initialize on.
//! - **engine**: Owns all of the above. Checks every caller, runs every
//!   fallible operation atomically, records events.
//! - **tokens**: Host custody of fungible assets: balances, allowances,
//!   supply.
//! - **events**: What happened, in order, rolled back with everything else.
//! - **math**: 256-bit intermediate fixed-point math. No floats, ever.
//! - **config**: Protocol constants and tunable ledger parameters.
//!
//! ## Design Philosophy
//!
//! 1. A failed operation never happened. Not partially, not in the event log.
//! 2. Units, not balances, are the source of truth for ownership.
//! 3. Rounding always favors the basket over whoever is leaving it.
//! 4. Every state transition is an explicit enum variant with an explicit
//!    error for each way it can be refused.

pub mod adapter;
pub mod basket;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod factory;
pub mod math;
pub mod registry;
pub mod tokens;
pub mod types;

pub use adapter::{Adapter, CallData, Intent, Invocation, Quote, Tolerance, TokenFlow};
pub use basket::{Basket, BasketRequest, Position, PositionKind};
pub use config::LedgerConfig;
pub use directory::AdapterDirectory;
pub use engine::Engine;
pub use error::LedgerError;
pub use events::{EventRecord, LedgerEvent};
pub use factory::BasketFactory;
pub use registry::Registry;
pub use types::{Address, ModuleState, ResourceId};
