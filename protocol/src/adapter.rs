//! # Adapter Protocol
//!
//! An adapter translates a generic intent (swap, add liquidity, remove
//! liquidity) into whatever a specific venue needs. Modules never learn the
//! venue's details: they ask the [`AdapterDirectory`](crate::directory::AdapterDirectory)
//! for an adapter by integration name, ask it for a [`Quote`], hand the
//! quote's opaque [`CallData`] back to the engine for execution, and then
//! reconcile what actually moved against what the quote promised.
//!
//! ## Execution Model
//!
//! ```text
//! module ──quote(intent)──► adapter          (read-only, &Engine)
//! module ──invoke(call)───► engine ──execute(Invocation)──► adapter
//!                                         │
//!                                         └─ pull / pay / mint / burn on
//!                                            the acting account's custody
//! ```
//!
//! [`Invocation`] is the adapter's only handle on mutable state. It acts on
//! behalf of one account (a basket, or a module's own custody) and exposes
//! the engine so a hostile venue can attempt a callback; the basket lock
//! turns such callbacks into [`LedgerError::ReentrantCall`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::Engine;
use crate::error::LedgerError;
use crate::math::bps_of;
use crate::types::Address;

// ---------------------------------------------------------------------------
// Intents & Quotes
// ---------------------------------------------------------------------------

/// What a module wants a venue to do, in venue-neutral terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// Exchange `source_amount` of `source` for at least
    /// `min_destination_amount` of `destination`.
    Swap {
        source: Address,
        destination: Address,
        source_amount: u128,
        min_destination_amount: u128,
    },
    /// Deposit up to `max_amounts` of `components` into `pool` for at least
    /// `min_liquidity` pool tokens.
    AddLiquidity {
        pool: Address,
        components: Vec<Address>,
        max_amounts: Vec<u128>,
        min_liquidity: u128,
    },
    /// Burn `liquidity` pool tokens for at least `min_amounts` of
    /// `components`.
    RemoveLiquidity {
        pool: Address,
        liquidity: u128,
        components: Vec<Address>,
        min_amounts: Vec<u128>,
    },
}

/// One asset movement, seen from the acting account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFlow {
    /// Asset that moved.
    pub asset: Address,
    /// Signed amount: positive flowed into the account, negative out of it.
    pub amount: i128,
}

impl TokenFlow {
    /// Flow of `amount` into the account.
    pub fn inflow(asset: Address, amount: u128) -> Result<Self, LedgerError> {
        Ok(Self {
            asset,
            amount: crate::math::to_signed(amount)?,
        })
    }

    /// Flow of `amount` out of the account.
    pub fn outflow(asset: Address, amount: u128) -> Result<Self, LedgerError> {
        Ok(Self {
            asset,
            amount: -crate::math::to_signed(amount)?,
        })
    }
}

/// Opaque, venue-specific instructions. The kernel only carries them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallData(Bytes);

impl CallData {
    /// Wraps raw bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Encodes a venue's instruction type with `bincode`.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, LedgerError> {
        bincode::serialize(value)
            .map(|raw| Self(Bytes::from(raw)))
            .map_err(|e| LedgerError::AdapterFailure(format!("cannot encode call data: {e}")))
    }

    /// Decodes what [`encode`](Self::encode) produced.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, LedgerError> {
        bincode::deserialize(&self.0)
            .map_err(|e| LedgerError::AdapterFailure(format!("malformed call data: {e}")))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A venue's answer to an [`Intent`]: the flows it expects to produce and the
/// call data that will produce them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Expected movements, seen from the acting account.
    pub expected: Vec<TokenFlow>,
    /// Instructions to pass to [`Engine::invoke`].
    pub call_data: CallData,
}

impl Quote {
    /// Net expected amount of `asset` flowing in (0 if it flows out).
    pub fn inflow_of(&self, asset: &Address) -> u128 {
        let net = net_flow(&self.expected, asset);
        u128::try_from(net).unwrap_or(0)
    }

    /// Net expected amount of `asset` flowing out (0 if it flows in).
    pub fn outflow_of(&self, asset: &Address) -> u128 {
        let net = net_flow(&self.expected, asset);
        if net < 0 {
            net.unsigned_abs()
        } else {
            0
        }
    }
}

/// Sum of every flow of `asset` in `flows`, saturating.
pub fn net_flow(flows: &[TokenFlow], asset: &Address) -> i128 {
    flows
        .iter()
        .filter(|flow| &flow.asset == asset)
        .fold(0i128, |acc, flow| acc.saturating_add(flow.amount))
}

// ---------------------------------------------------------------------------
// Adapter Trait
// ---------------------------------------------------------------------------

/// A translator between generic intents and one venue.
///
/// Implementations hold only configuration. Anything that must roll back
/// with a failed operation (reserves, pool token supply) lives in the
/// engine's token ledger and is reached through [`Invocation`].
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Short identifier of the venue implementation, for logs and listings.
    fn name(&self) -> &str;

    /// Prices `intent` for `account` without touching state.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AdapterFailure`] if the venue cannot serve the intent
    /// (unknown pool, unsupported pair, insufficient depth, ...).
    fn quote(&self, engine: &Engine, account: &Address, intent: &Intent) -> Result<Quote, LedgerError>;

    /// Executes call data previously produced by [`quote`](Self::quote),
    /// returning the flows it caused.
    fn execute(&self, inv: &mut Invocation<'_>, call: &CallData) -> Result<Vec<TokenFlow>, LedgerError>;

    /// Quotes a plain swap and returns the destination amount together with
    /// the call data that performs it.
    fn quote_swap(
        &self,
        engine: &Engine,
        account: &Address,
        source: &Address,
        destination: &Address,
        source_amount: u128,
    ) -> Result<(u128, CallData), LedgerError> {
        let quote = self.quote(
            engine,
            account,
            &Intent::Swap {
                source: source.clone(),
                destination: destination.clone(),
                source_amount,
                min_destination_amount: 0,
            },
        )?;
        Ok((quote.inflow_of(destination), quote.call_data))
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Mutable access granted to an adapter for the duration of one `execute`.
///
/// All movements are relative to [`account`](Self::account): `pull` sends
/// from it, `pay` delivers to it.
pub struct Invocation<'a> {
    engine: &'a mut Engine,
    account: Address,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(engine: &'a mut Engine, account: Address) -> Self {
        Self { engine, account }
    }

    /// The account the adapter is acting for.
    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Current balance of `holder` in `asset`.
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
        self.engine.tokens().balance_of(asset, holder)
    }

    /// Total supply of `asset`.
    pub fn total_supply(&self, asset: &Address) -> u128 {
        self.engine.tokens().total_supply(asset)
    }

    /// Moves `amount` of `asset` from the acting account to `to`.
    pub fn pull(&mut self, asset: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        let from = self.account.clone();
        self.engine.tokens_mut().transfer(asset, &from, to, amount)
    }

    /// Moves `amount` of `asset` from `from` (a venue account) to the acting
    /// account.
    pub fn pay(&mut self, asset: &Address, from: &Address, amount: u128) -> Result<(), LedgerError> {
        let to = self.account.clone();
        self.engine.tokens_mut().transfer(asset, from, &to, amount)
    }

    /// Issues `amount` of a venue-issued asset (pool tokens) to the acting
    /// account.
    pub fn mint_to_account(&mut self, asset: &Address, amount: u128) -> Result<(), LedgerError> {
        let to = self.account.clone();
        self.engine.tokens_mut().mint(asset, &to, amount)
    }

    /// Destroys `amount` of a venue-issued asset held by the acting account.
    pub fn burn_from_account(&mut self, asset: &Address, amount: u128) -> Result<(), LedgerError> {
        let from = self.account.clone();
        self.engine.tokens_mut().burn(asset, &from, amount)
    }

    /// The engine itself, for venues that call back into the ledger.
    pub fn engine(&mut self) -> &mut Engine {
        self.engine
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// How far a measured movement may diverge from the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tolerance {
    /// Must match exactly.
    Exact,
    /// May differ by this many basis points of the expected magnitude.
    Bps(u32),
    /// May differ by this absolute amount.
    Absolute(u128),
}

/// Checks a measured flow against the expected one.
///
/// # Errors
///
/// [`LedgerError::SlippageOrReconciliation`] when `|actual - expected|`
/// exceeds `tolerance`.
pub fn reconcile(
    asset: &Address,
    expected: i128,
    actual: i128,
    tolerance: Tolerance,
) -> Result<(), LedgerError> {
    let diff = expected.abs_diff(actual);
    let allowed = match tolerance {
        Tolerance::Exact => 0,
        Tolerance::Bps(bps) => bps_of(expected.unsigned_abs(), bps)?,
        Tolerance::Absolute(amount) => amount,
    };
    if diff > allowed {
        return Err(LedgerError::SlippageOrReconciliation {
            asset: asset.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Checks that at least `minimum` of `asset` was received.
pub fn ensure_received(asset: &Address, minimum: u128, received: u128) -> Result<(), LedgerError> {
    if received < minimum {
        return Err(LedgerError::SlippageOrReconciliation {
            asset: asset.clone(),
            expected: i128::try_from(minimum).unwrap_or(i128::MAX),
            actual: i128::try_from(received).unwrap_or(i128::MAX),
        });
    }
    Ok(())
}
