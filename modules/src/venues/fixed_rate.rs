//! Fixed-rate exchange desk.
//!
//! Swaps at a configured rate out of a single reserve account. Useful as a
//! deterministic venue for fund purchases where pool price impact would get
//! in the way.

use serde::{Deserialize, Serialize};
use tracing::debug;
use trove_protocol::adapter::{Adapter, CallData, Intent, Invocation, Quote, TokenFlow};
use trove_protocol::config::PRECISE_UNIT;
use trove_protocol::math::precise_mul;
use trove_protocol::{Address, Engine, LedgerError};

use super::{ReserveView, VenueError};

/// `destination = source_amount * rate / 1e18`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    pub source: Address,
    pub destination: Address,
    #[serde(with = "trove_protocol::math::u128_string")]
    pub rate: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeskCall {
    source: Address,
    destination: Address,
    amount_in: u128,
    min_out: u128,
}

/// Swap-only venue quoting fixed rates.
#[derive(Debug, Clone)]
pub struct FixedRateVenue {
    name: String,
    reserve: Address,
    rates: Vec<RateConfig>,
}

impl FixedRateVenue {
    pub fn new(name: impl Into<String>, reserve: Address, rates: Vec<RateConfig>) -> Self {
        Self {
            name: name.into(),
            reserve,
            rates,
        }
    }

    /// Account the desk pays out of and receives into.
    pub fn reserve(&self) -> &Address {
        &self.reserve
    }

    pub fn rates(&self) -> &[RateConfig] {
        &self.rates
    }

    fn rate(&self, source: &Address, destination: &Address) -> Result<u128, VenueError> {
        self.rates
            .iter()
            .find(|r| &r.source == source && &r.destination == destination)
            .map(|r| r.rate)
            .ok_or_else(|| VenueError::UnsupportedPair {
                source: source.clone(),
                destination: destination.clone(),
            })
    }

    fn amount_out(&self, view: &impl ReserveView, call: &DeskCall) -> Result<u128, LedgerError> {
        if call.amount_in == 0 {
            return Err(VenueError::ZeroAmount.into());
        }
        let rate = self.rate(&call.source, &call.destination)?;
        let out = precise_mul(call.amount_in, rate, PRECISE_UNIT)?;
        if out == 0 || view.balance(&call.destination, &self.reserve) < out {
            return Err(VenueError::InsufficientLiquidity(self.reserve.clone()).into());
        }
        if out < call.min_out {
            return Err(VenueError::InsufficientOutput {
                minimum: call.min_out,
                actual: out,
            }
            .into());
        }
        Ok(out)
    }
}

impl Adapter for FixedRateVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn quote(&self, engine: &Engine, _account: &Address, intent: &Intent) -> Result<Quote, LedgerError> {
        let call = match intent {
            Intent::Swap {
                source,
                destination,
                source_amount,
                min_destination_amount,
            } => DeskCall {
                source: source.clone(),
                destination: destination.clone(),
                amount_in: *source_amount,
                min_out: *min_destination_amount,
            },
            Intent::AddLiquidity { .. } => return Err(VenueError::UnsupportedIntent("add liquidity").into()),
            Intent::RemoveLiquidity { .. } => return Err(VenueError::UnsupportedIntent("remove liquidity").into()),
        };
        let out = self.amount_out(engine, &call)?;
        Ok(Quote {
            expected: vec![
                TokenFlow::outflow(call.source.clone(), call.amount_in)?,
                TokenFlow::inflow(call.destination.clone(), out)?,
            ],
            call_data: CallData::encode(&call)?,
        })
    }

    fn execute(&self, inv: &mut Invocation<'_>, call: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
        let call: DeskCall = call.decode()?;
        let out = self.amount_out(&*inv, &call)?;
        inv.pull(&call.source, &self.reserve, call.amount_in)?;
        inv.pay(&call.destination, &self.reserve, out)?;
        debug!(venue = %self.name, source = %call.source, destination = %call.destination, amount_in = %call.amount_in, amount_out = %out, "desk swap settled");
        Ok(vec![
            TokenFlow::outflow(call.source, call.amount_in)?,
            TokenFlow::inflow(call.destination, out)?,
        ])
    }
}
