//! # Genesis
//!
//! A node starts from a TOML genesis file describing the admin, ledger
//! parameters, pre-funded balances, venues and their bindings, and any
//! baskets that should exist from the first request on. [`Genesis::build`]
//! replays it against a fresh [`Engine`] through the same admin and factory
//! entry points a client would use, so a genesis that builds is a ledger
//! that could have been reached by normal operation.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use trove_modules::{
    AmmModule, BasicIssuanceModule, ConstantProductVenue, EtfFundModule, FixedRateVenue, Module, ModuleError,
    PoolConfig, RateConfig, TradeModule, VenueError,
};
use trove_protocol::{Adapter, Address, BasketFactory, BasketRequest, Engine, LedgerConfig, LedgerError};

/// The devnet genesis compiled into the binary.
pub const DEVNET_GENESIS: &str = include_str!("../genesis.toml");

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("failed to read genesis file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid genesis TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("genesis rejected by the ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("genesis rejected by a module: {0}")]
    Module(#[from] ModuleError),

    #[error("invalid venue: {0}")]
    Venue(#[from] VenueError),

    #[error("binding refers to unknown venue '{0}'")]
    UnknownVenue(String),

    #[error("venue '{0}' is declared twice")]
    DuplicateVenue(String),
}

/// Parsed genesis file.
#[derive(Debug, Clone, Deserialize)]
pub struct Genesis {
    /// Registry and directory admin.
    pub admin: Address,
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Identity of the node's basket factory.
    #[serde(default = "default_factory")]
    pub factory: Address,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
    #[serde(default)]
    pub baskets: Vec<GenesisBasket>,
}

/// Identities of the modules the node hosts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub issuance: Address,
    pub trade: Address,
    pub amm: Address,
    pub fund: Address,
    /// Asset the fund module buys baskets with.
    pub quote_asset: Address,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            issuance: Address::new("mod-issuance"),
            trade: Address::new("mod-trade"),
            amm: Address::new("mod-amm"),
            fund: Address::new("mod-fund"),
            quote_asset: Address::new("USDC"),
        }
    }
}

fn default_factory() -> Address {
    Address::new("factory")
}

/// Tokens minted to `holder` at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceEntry {
    pub asset: Address,
    pub holder: Address,
    #[serde(with = "trove_protocol::math::u128_string")]
    pub amount: u128,
}

/// A venue adapter instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VenueConfig {
    ConstantProduct {
        name: String,
        #[serde(default = "default_fee_bps")]
        fee_bps: u32,
        pools: Vec<PoolConfig>,
    },
    FixedRate {
        name: String,
        reserve: Address,
        rates: Vec<RateConfig>,
    },
}

fn default_fee_bps() -> u32 {
    30
}

impl VenueConfig {
    pub fn name(&self) -> &str {
        match self {
            VenueConfig::ConstantProduct { name, .. } | VenueConfig::FixedRate { name, .. } => name,
        }
    }

    fn build(&self) -> Result<Arc<dyn Adapter>, VenueError> {
        Ok(match self {
            VenueConfig::ConstantProduct { name, fee_bps, pools } => {
                Arc::new(ConstantProductVenue::new(name.clone(), *fee_bps, pools.clone())?)
            }
            VenueConfig::FixedRate { name, reserve, rates } => {
                Arc::new(FixedRateVenue::new(name.clone(), reserve.clone(), rates.clone()))
            }
        })
    }
}

/// Binds a declared venue under `name` for `module`.
#[derive(Debug, Clone, Deserialize)]
pub struct BindingConfig {
    pub module: Address,
    pub name: String,
    pub venue: String,
}

/// A basket created through the node's factory at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisBasket {
    #[serde(flatten)]
    pub request: BasketRequest,
    /// Initialize every listed module on behalf of the manager.
    #[serde(default)]
    pub initialize: bool,
}

/// The modules a node hosts, looked up by identity.
#[derive(Debug, Clone)]
pub struct HostedModules {
    pub issuance: BasicIssuanceModule,
    pub trade: TradeModule,
    pub amm: AmmModule,
    pub fund: EtfFundModule,
}

impl HostedModules {
    fn from_config(config: &ModulesConfig) -> Self {
        Self {
            issuance: BasicIssuanceModule::new(config.issuance.clone()),
            trade: TradeModule::new(config.trade.clone()),
            amm: AmmModule::new(config.amm.clone()),
            fund: EtfFundModule::new(config.fund.clone(), config.quote_asset.clone()),
        }
    }

    /// The hosted module with identity `address`.
    pub fn get(&self, address: &Address) -> Option<&dyn Module> {
        self.iter().find(|module| module.address() == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Module> {
        [
            &self.issuance as &dyn Module,
            &self.trade as &dyn Module,
            &self.amm as &dyn Module,
            &self.fund as &dyn Module,
        ]
        .into_iter()
    }
}

/// Everything the API serves: the ledger plus the actors allowed to drive it.
#[derive(Debug)]
pub struct NodeContext {
    pub engine: Engine,
    pub factory: BasketFactory,
    pub modules: HostedModules,
}

impl Genesis {
    /// Reads and parses a genesis file.
    pub fn load(path: &Path) -> Result<Self, GenesisError> {
        let raw = std::fs::read_to_string(path).map_err(|source| GenesisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, GenesisError> {
        Ok(toml::from_str(raw)?)
    }

    /// The built-in devnet genesis.
    pub fn devnet() -> Result<Self, GenesisError> {
        Self::from_toml(DEVNET_GENESIS)
    }

    /// Builds the ledger this genesis describes.
    ///
    /// # Errors
    ///
    /// The first refusal from the ledger, a module or a venue constructor,
    /// or a binding naming a venue that was never declared.
    pub fn build(&self) -> Result<NodeContext, GenesisError> {
        let admin = &self.admin;
        let mut engine = Engine::new(admin.clone(), self.ledger.clone())?;

        let factory = BasketFactory::new(self.factory.clone());
        engine.add_factory(admin, factory.address().clone())?;

        let modules = HostedModules::from_config(&self.modules);
        for module in modules.iter() {
            engine.add_module(admin, module.address().clone())?;
        }

        for entry in &self.balances {
            engine.fund(admin, &entry.asset, &entry.holder, entry.amount)?;
        }

        let mut venues: HashMap<&str, Arc<dyn Adapter>> = HashMap::new();
        for venue in &self.venues {
            if venues.contains_key(venue.name()) {
                return Err(GenesisError::DuplicateVenue(venue.name().to_string()));
            }
            venues.insert(venue.name(), venue.build()?);
        }

        for binding in &self.bindings {
            let adapter = venues
                .get(binding.venue.as_str())
                .ok_or_else(|| GenesisError::UnknownVenue(binding.venue.clone()))?;
            engine.bind_integration(admin, binding.module.clone(), &binding.name, adapter.clone())?;
        }

        for basket in &self.baskets {
            let address = factory.create(&mut engine, basket.request.clone())?;
            if basket.initialize {
                for module in &basket.request.modules {
                    match modules.get(module) {
                        Some(hosted) => hosted.initialize(&mut engine, &basket.request.manager, &address)?,
                        None => engine.initialize_module(module, &address)?,
                    }
                }
            }
        }

        info!(
            baskets = self.baskets.len(),
            venues = venues.len(),
            bindings = self.bindings.len(),
            events = engine.events().next_sequence(),
            "genesis applied"
        );

        Ok(NodeContext {
            engine,
            factory,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use trove_protocol::ModuleState;

    #[test]
    fn devnet_genesis_builds() {
        let context = Genesis::devnet().unwrap().build().unwrap();
        assert_eq!(context.engine.config().event_retention, 50_000);
        let basket = context.engine.baskets().next().unwrap();
        assert_eq!(basket.symbol(), "DPI");
        for (_, state) in basket.modules() {
            assert_eq!(state, ModuleState::Initialized);
        }
        assert!(!context.engine.directory().bindings().is_empty());
        assert!(context.engine.registry().is_factory(context.factory.address()));
    }

    #[test]
    fn minimal_genesis_uses_defaults() {
        let genesis = Genesis::from_toml(r#"admin = "root""#).unwrap();
        assert_eq!(genesis.factory, Address::new("factory"));
        assert_eq!(genesis.ledger, LedgerConfig::default());
        let context = genesis.build().unwrap();
        assert_eq!(context.engine.registry().modules().count(), 4);
        assert_eq!(context.engine.baskets().count(), 0);
    }

    #[test]
    fn amounts_accept_strings_and_integers() {
        let genesis = Genesis::from_toml(
            r#"
            admin = "root"

            [[balances]]
            asset = "A"
            holder = "alice"
            amount = "340282366920938463463374607431768211455"

            [[balances]]
            asset = "B"
            holder = "alice"
            amount = 5
            "#,
        )
        .unwrap();
        assert_eq!(genesis.balances[0].amount, u128::MAX);
        let context = genesis.build().unwrap();
        assert_eq!(context.engine.balance_of(&"B".into(), &"alice".into()), 5);
    }

    #[test]
    fn binding_to_undeclared_venue_fails() {
        let err = Genesis::from_toml(
            r#"
            admin = "root"

            [[bindings]]
            module = "mod-trade"
            name = "uni"
            venue = "nowhere"
            "#,
        )
        .unwrap()
        .build()
        .unwrap_err();
        assert!(matches!(err, GenesisError::UnknownVenue(name) if name == "nowhere"));
    }

    #[test]
    fn duplicate_venue_names_fail() {
        let err = Genesis::from_toml(
            r#"
            admin = "root"

            [[venues]]
            kind = "fixed_rate"
            name = "desk"
            reserve = "desk"
            rates = []

            [[venues]]
            kind = "fixed_rate"
            name = "desk"
            reserve = "desk-2"
            rates = []
            "#,
        )
        .unwrap()
        .build()
        .unwrap_err();
        assert!(matches!(err, GenesisError::DuplicateVenue(_)));
    }

    #[test]
    fn invalid_basket_is_reported_as_ledger_error() {
        let err = Genesis::from_toml(
            r#"
            admin = "root"

            [[baskets]]
            components = ["A"]
            units = ["0"]
            modules = []
            manager = "m"
            name = "Zero"
            symbol = "Z"
            "#,
        )
        .unwrap()
        .build()
        .unwrap_err();
        assert!(matches!(err, GenesisError::Ledger(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEVNET_GENESIS.as_bytes()).unwrap();
        let genesis = Genesis::load(file.path()).unwrap();
        assert_eq!(genesis.admin, Address::new("admin"));

        let missing = Genesis::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(missing, GenesisError::Io { .. }));
    }
}
