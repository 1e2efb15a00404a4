//! Constant-product pools (`x * y = k`).
//!
//! Each pool's address doubles as its pool token. Reserves are the pool
//! address's balances of its two tokens; liquidity outstanding is the pool
//! token's total supply.

use serde::{Deserialize, Serialize};
use tracing::debug;
use trove_protocol::adapter::{Adapter, CallData, Intent, Invocation, Quote, TokenFlow};
use trove_protocol::config::BPS_DENOMINATOR;
use trove_protocol::math::{mul_div, sqrt_product, Rounding};
use trove_protocol::{Address, Engine, LedgerError};

use super::{ReserveView, VenueError};

/// One pool of a [`ConstantProductVenue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool (and pool token) address.
    pub address: Address,
    pub token_a: Address,
    pub token_b: Address,
}

impl PoolConfig {
    fn tokens(&self) -> [Address; 2] {
        [self.token_a.clone(), self.token_b.clone()]
    }

    fn trades(&self, source: &Address, destination: &Address) -> bool {
        (source == &self.token_a && destination == &self.token_b)
            || (source == &self.token_b && destination == &self.token_a)
    }
}

/// Instructions carried in [`CallData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum PoolCall {
    Swap {
        pool: Address,
        source: Address,
        destination: Address,
        amount_in: u128,
        min_out: u128,
    },
    Deposit {
        pool: Address,
        max_a: u128,
        max_b: u128,
        min_liquidity: u128,
    },
    Withdraw {
        pool: Address,
        liquidity: u128,
        min_a: u128,
        min_b: u128,
    },
}

/// What a call settles to against the current reserves.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Swap {
        pool: Address,
        source: Address,
        destination: Address,
        amount_in: u128,
        amount_out: u128,
    },
    Deposit {
        pool: Address,
        amounts: [(Address, u128); 2],
        liquidity: u128,
    },
    Withdraw {
        pool: Address,
        amounts: [(Address, u128); 2],
        liquidity: u128,
    },
}

impl Settlement {
    fn flows(&self) -> Result<Vec<TokenFlow>, LedgerError> {
        match self {
            Settlement::Swap {
                source,
                destination,
                amount_in,
                amount_out,
                ..
            } => Ok(vec![
                TokenFlow::outflow(source.clone(), *amount_in)?,
                TokenFlow::inflow(destination.clone(), *amount_out)?,
            ]),
            Settlement::Deposit {
                pool,
                amounts,
                liquidity,
            } => {
                let mut flows = Vec::with_capacity(3);
                for (asset, amount) in amounts {
                    flows.push(TokenFlow::outflow(asset.clone(), *amount)?);
                }
                flows.push(TokenFlow::inflow(pool.clone(), *liquidity)?);
                Ok(flows)
            }
            Settlement::Withdraw {
                pool,
                amounts,
                liquidity,
            } => {
                let mut flows = vec![TokenFlow::outflow(pool.clone(), *liquidity)?];
                for (asset, amount) in amounts {
                    flows.push(TokenFlow::inflow(asset.clone(), *amount)?);
                }
                Ok(flows)
            }
        }
    }
}

/// A set of `x * y = k` pools sharing one swap fee.
#[derive(Debug, Clone)]
pub struct ConstantProductVenue {
    name: String,
    fee_bps: u32,
    pools: Vec<PoolConfig>,
}

impl ConstantProductVenue {
    /// # Errors
    ///
    /// [`VenueError::InvalidFee`] unless `fee_bps < 10_000`.
    pub fn new(name: impl Into<String>, fee_bps: u32, pools: Vec<PoolConfig>) -> Result<Self, VenueError> {
        if u128::from(fee_bps) >= BPS_DENOMINATOR {
            return Err(VenueError::InvalidFee(fee_bps));
        }
        Ok(Self {
            name: name.into(),
            fee_bps,
            pools,
        })
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    fn pool(&self, address: &Address) -> Result<&PoolConfig, VenueError> {
        self.pools
            .iter()
            .find(|pool| &pool.address == address)
            .ok_or_else(|| VenueError::UnknownPool(address.clone()))
    }

    fn pool_for_pair(&self, source: &Address, destination: &Address) -> Result<&PoolConfig, VenueError> {
        self.pools
            .iter()
            .find(|pool| pool.trades(source, destination))
            .ok_or_else(|| VenueError::UnsupportedPair {
                source: source.clone(),
                destination: destination.clone(),
            })
    }

    /// Orders `(component, amount)` pairs as `(token_a, token_b)`.
    fn align(pool: &PoolConfig, components: &[Address], amounts: &[u128]) -> Result<(u128, u128), VenueError> {
        let mismatch = || VenueError::ComponentMismatch {
            pool: pool.address.clone(),
            expected: pool.tokens(),
        };
        match (components, amounts) {
            ([first, second], [x, y]) if first == &pool.token_a && second == &pool.token_b => Ok((*x, *y)),
            ([first, second], [x, y]) if first == &pool.token_b && second == &pool.token_a => Ok((*y, *x)),
            _ => Err(mismatch()),
        }
    }

    fn to_call(&self, intent: &Intent) -> Result<PoolCall, VenueError> {
        match intent {
            Intent::Swap {
                source,
                destination,
                source_amount,
                min_destination_amount,
            } => {
                let pool = self.pool_for_pair(source, destination)?;
                Ok(PoolCall::Swap {
                    pool: pool.address.clone(),
                    source: source.clone(),
                    destination: destination.clone(),
                    amount_in: *source_amount,
                    min_out: *min_destination_amount,
                })
            }
            Intent::AddLiquidity {
                pool,
                components,
                max_amounts,
                min_liquidity,
            } => {
                let config = self.pool(pool)?;
                let (max_a, max_b) = Self::align(config, components, max_amounts)?;
                Ok(PoolCall::Deposit {
                    pool: pool.clone(),
                    max_a,
                    max_b,
                    min_liquidity: *min_liquidity,
                })
            }
            Intent::RemoveLiquidity {
                pool,
                liquidity,
                components,
                min_amounts,
            } => {
                let config = self.pool(pool)?;
                let (min_a, min_b) = Self::align(config, components, min_amounts)?;
                Ok(PoolCall::Withdraw {
                    pool: pool.clone(),
                    liquidity: *liquidity,
                    min_a,
                    min_b,
                })
            }
        }
    }

    /// Prices `call` against the reserves visible through `view` for
    /// `account`.
    fn settle(&self, view: &impl ReserveView, account: &Address, call: &PoolCall) -> Result<Settlement, LedgerError> {
        match call {
            PoolCall::Swap {
                pool,
                source,
                destination,
                amount_in,
                min_out,
            } => {
                let config = self.pool(pool)?;
                if !config.trades(source, destination) {
                    return Err(VenueError::UnsupportedPair {
                        source: source.clone(),
                        destination: destination.clone(),
                    }
                    .into());
                }
                if *amount_in == 0 {
                    return Err(VenueError::ZeroAmount.into());
                }
                let reserve_in = view.balance(source, pool);
                let reserve_out = view.balance(destination, pool);
                if reserve_in == 0 || reserve_out == 0 {
                    return Err(VenueError::InsufficientLiquidity(pool.clone()).into());
                }
                let amount_out = self.amount_out(*amount_in, reserve_in, reserve_out)?;
                if amount_out == 0 {
                    return Err(VenueError::InsufficientLiquidity(pool.clone()).into());
                }
                if amount_out < *min_out {
                    return Err(VenueError::InsufficientOutput {
                        minimum: *min_out,
                        actual: amount_out,
                    }
                    .into());
                }
                Ok(Settlement::Swap {
                    pool: pool.clone(),
                    source: source.clone(),
                    destination: destination.clone(),
                    amount_in: *amount_in,
                    amount_out,
                })
            }
            PoolCall::Deposit {
                pool,
                max_a,
                max_b,
                min_liquidity,
            } => {
                let config = self.pool(pool)?;
                let reserve_a = view.balance(&config.token_a, pool);
                let reserve_b = view.balance(&config.token_b, pool);
                let supply = view.supply(pool);

                let (amount_a, amount_b, liquidity) = if supply == 0 {
                    (*max_a, *max_b, sqrt_product(*max_a, *max_b))
                } else {
                    if reserve_a == 0 || reserve_b == 0 {
                        return Err(VenueError::InsufficientLiquidity(pool.clone()).into());
                    }
                    let optimal_b = mul_div(*max_a, reserve_b, reserve_a, Rounding::Down)?;
                    let (a, b) = if optimal_b <= *max_b {
                        (*max_a, optimal_b)
                    } else {
                        (mul_div(*max_b, reserve_a, reserve_b, Rounding::Down)?, *max_b)
                    };
                    let liquidity = mul_div(a, supply, reserve_a, Rounding::Down)?
                        .min(mul_div(b, supply, reserve_b, Rounding::Down)?);
                    (a, b, liquidity)
                };
                if liquidity == 0 {
                    return Err(VenueError::ZeroAmount.into());
                }
                if liquidity < *min_liquidity {
                    return Err(VenueError::InsufficientOutput {
                        minimum: *min_liquidity,
                        actual: liquidity,
                    }
                    .into());
                }
                Ok(Settlement::Deposit {
                    pool: pool.clone(),
                    amounts: [(config.token_a.clone(), amount_a), (config.token_b.clone(), amount_b)],
                    liquidity,
                })
            }
            PoolCall::Withdraw {
                pool,
                liquidity,
                min_a,
                min_b,
            } => {
                let config = self.pool(pool)?;
                if *liquidity == 0 {
                    return Err(VenueError::ZeroAmount.into());
                }
                let held = view.balance(pool, account);
                if held < *liquidity {
                    return Err(LedgerError::InsufficientBalance {
                        asset: pool.clone(),
                        account: account.clone(),
                        available: held,
                        requested: *liquidity,
                    });
                }
                let supply = view.supply(pool);
                let amount_a = mul_div(*liquidity, view.balance(&config.token_a, pool), supply, Rounding::Down)?;
                let amount_b = mul_div(*liquidity, view.balance(&config.token_b, pool), supply, Rounding::Down)?;
                for (minimum, actual) in [(*min_a, amount_a), (*min_b, amount_b)] {
                    if actual < minimum {
                        return Err(VenueError::InsufficientOutput { minimum, actual }.into());
                    }
                }
                Ok(Settlement::Withdraw {
                    pool: pool.clone(),
                    amounts: [(config.token_a.clone(), amount_a), (config.token_b.clone(), amount_b)],
                    liquidity: *liquidity,
                })
            }
        }
    }

    fn amount_out(&self, amount_in: u128, reserve_in: u128, reserve_out: u128) -> Result<u128, LedgerError> {
        let keep = BPS_DENOMINATOR - u128::from(self.fee_bps);
        let in_after_fee = mul_div(amount_in, keep, BPS_DENOMINATOR, Rounding::Down)?;
        let denominator = reserve_in
            .checked_add(in_after_fee)
            .ok_or(LedgerError::ArithmeticOverflow("pool reserve"))?;
        mul_div(in_after_fee, reserve_out, denominator, Rounding::Down)
    }
}

impl Adapter for ConstantProductVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn quote(&self, engine: &Engine, account: &Address, intent: &Intent) -> Result<Quote, LedgerError> {
        let call = self.to_call(intent)?;
        let settlement = self.settle(engine, account, &call)?;
        Ok(Quote {
            expected: settlement.flows()?,
            call_data: CallData::encode(&call)?,
        })
    }

    fn execute(&self, inv: &mut Invocation<'_>, call: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
        let call: PoolCall = call.decode()?;
        let account = inv.account().clone();
        let settlement = self.settle(&*inv, &account, &call)?;
        match &settlement {
            Settlement::Swap {
                pool,
                source,
                destination,
                amount_in,
                amount_out,
            } => {
                inv.pull(source, pool, *amount_in)?;
                inv.pay(destination, pool, *amount_out)?;
                debug!(venue = %self.name, pool = %pool, amount_in = %amount_in, amount_out = %amount_out, "swap settled");
            }
            Settlement::Deposit {
                pool,
                amounts,
                liquidity,
            } => {
                for (asset, amount) in amounts {
                    inv.pull(asset, pool, *amount)?;
                }
                inv.mint_to_account(pool, *liquidity)?;
                debug!(venue = %self.name, pool = %pool, liquidity = %liquidity, "liquidity deposited");
            }
            Settlement::Withdraw {
                pool,
                amounts,
                liquidity,
            } => {
                inv.burn_from_account(pool, *liquidity)?;
                for (asset, amount) in amounts {
                    inv.pay(asset, pool, *amount)?;
                }
                debug!(venue = %self.name, pool = %pool, liquidity = %liquidity, "liquidity withdrawn");
            }
        }
        settlement.flows()
    }
}
