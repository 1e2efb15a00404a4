// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Trove Modules
//!
//! Business logic for Trove baskets, written strictly against the kernel's
//! public primitives. A module never edits a balance or a position directly:
//! it asks the engine, inside [`Engine::operate`](trove_protocol::Engine::operate),
//! and everything it did rolls back if any step fails.
//!
//! ## Modules
//!
//! - **issuance**: Mint shares against a full component deposit, redeem
//!   them for a pro-rata payout.
//! - **trade**: Manager swaps between default positions through a bound
//!   venue.
//! - **amm**: Manager deploys default positions into a liquidity pool,
//!   tracked as an external position.
//! - **etf_fund**: Buy shares with a single quote asset.
//!
//! ## Venues
//!
//! [`venues`] ships two reference [`Adapter`](trove_protocol::Adapter)s: a
//! constant-product pool set and a fixed-rate desk.

pub mod amm;
pub mod error;
pub mod etf_fund;
pub mod issuance;
pub mod module;
pub mod trade;
pub mod venues;

pub use amm::{AddLiquidityParams, AmmModule, LiquidityReceipt, RemoveLiquidityParams};
pub use error::ModuleError;
pub use etf_fund::{BuyParams, BuyReceipt, EtfFundModule};
pub use issuance::BasicIssuanceModule;
pub use module::Module;
pub use trade::{TradeModule, TradeParams, TradeReceipt};
pub use venues::{ConstantProductVenue, FixedRateVenue, PoolConfig, RateConfig, VenueError};
