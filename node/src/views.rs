//! JSON shapes the API returns. Amounts are decimal strings throughout.

use chrono::{DateTime, Utc};
use serde::Serialize;

use trove_protocol::math::u128_string;
use trove_protocol::{Address, Basket, Engine, LedgerError, ModuleState, Position, ResourceId};

/// An amount of one asset (or of one basket's shares).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub asset: Address,
    #[serde(with = "u128_string")]
    pub amount: u128,
}

impl Holding {
    pub fn list(pairs: Vec<(Address, u128)>) -> Vec<Holding> {
        pairs
            .into_iter()
            .map(|(asset, amount)| Holding { asset, amount })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct ModuleView {
    pub module: Address,
    pub state: ModuleState,
}

/// Full state of one basket.
#[derive(Debug, Serialize)]
pub struct BasketView {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub manager: Address,
    #[serde(with = "u128_string")]
    pub unit_scale: u128,
    #[serde(with = "u128_string")]
    pub total_supply: u128,
    pub share_split: Vec<u32>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub locked_by: Option<Address>,
    pub components: Vec<Address>,
    pub positions: Vec<Position>,
    /// What the basket's units entitle it to right now.
    pub real_holdings: Vec<Holding>,
    pub modules: Vec<ModuleView>,
}

impl BasketView {
    pub fn of(engine: &Engine, basket: &Basket) -> Result<Self, LedgerError> {
        let mut real_holdings = Vec::with_capacity(basket.components().len());
        for component in basket.components() {
            real_holdings.push(Holding {
                asset: component.clone(),
                amount: basket.real_holding(component)?,
            });
        }
        Ok(Self {
            address: basket.address().clone(),
            name: basket.name().to_string(),
            symbol: basket.symbol().to_string(),
            manager: basket.manager().clone(),
            unit_scale: basket.unit_scale(),
            total_supply: basket.total_supply(),
            share_split: basket.share_split().to_vec(),
            created_at: basket.created_at(),
            enabled: engine.registry().is_basket(basket.address()),
            locked_by: basket.locker().cloned(),
            components: basket.components().to_vec(),
            positions: basket.positions(),
            real_holdings,
            modules: basket
                .modules()
                .map(|(module, state)| ModuleView {
                    module: module.clone(),
                    state,
                })
                .collect(),
        })
    }
}

/// One row of `GET /baskets`.
#[derive(Debug, Serialize)]
pub struct BasketSummary {
    pub address: Address,
    pub symbol: String,
    pub manager: Address,
    #[serde(with = "u128_string")]
    pub total_supply: u128,
    pub components: usize,
}

impl From<&Basket> for BasketSummary {
    fn from(basket: &Basket) -> Self {
        Self {
            address: basket.address().clone(),
            symbol: basket.symbol().to_string(),
            manager: basket.manager().clone(),
            total_supply: basket.total_supply(),
            components: basket.components().len(),
        }
    }
}

/// Token balances and basket shares held by one identity.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub address: Address,
    pub tokens: Vec<Holding>,
    pub shares: Vec<Holding>,
}

impl AccountView {
    pub fn of(engine: &Engine, address: Address) -> Self {
        let tokens = Holding::list(engine.tokens().holdings_of(&address));
        let shares = engine
            .baskets()
            .filter_map(|basket| {
                let amount = basket.balance_of(&address);
                (amount > 0).then(|| Holding {
                    asset: basket.address().clone(),
                    amount,
                })
            })
            .collect();
        Self { address, tokens, shares }
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceView {
    pub id: ResourceId,
    pub endpoint: Address,
}

/// Registry contents.
#[derive(Debug, Serialize)]
pub struct RegistryView {
    pub admin: Address,
    pub modules: Vec<Address>,
    pub factories: Vec<Address>,
    pub resources: Vec<ResourceView>,
    pub baskets: Vec<Address>,
}

impl RegistryView {
    pub fn of(engine: &Engine) -> Self {
        let registry = engine.registry();
        Self {
            admin: registry.admin().clone(),
            modules: registry.modules().cloned().collect(),
            factories: registry.factories().cloned().collect(),
            resources: registry
                .resources()
                .map(|(id, endpoint)| ResourceView {
                    id,
                    endpoint: endpoint.clone(),
                })
                .collect(),
            baskets: registry.baskets().cloned().collect(),
        }
    }
}
