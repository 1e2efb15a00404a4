//! Shared fixture for the module integration tests.
//!
//! One engine, four initialized modules on one basket over [A, B] with
//! units [10, 5] and `unit_scale = 1`, a 100k/100k constant-product pool
//! and a 1:1 fixed-rate desk selling A and B for USDC.

#![allow(dead_code)]

use std::sync::Arc;

use trove_modules::venues::{ConstantProductVenue, FixedRateVenue, PoolConfig, RateConfig};
use trove_modules::{AmmModule, BasicIssuanceModule, EtfFundModule, Module, TradeModule};
use trove_protocol::config::PRECISE_UNIT;
use trove_protocol::{Address, BasketFactory, BasketRequest, Engine, LedgerConfig};

pub const POOL_RESERVE: u128 = 100_000;

pub fn admin() -> Address {
    Address::new("admin")
}

pub fn manager() -> Address {
    Address::new("manager")
}

pub fn alice() -> Address {
    Address::new("alice")
}

pub fn bob() -> Address {
    Address::new("bob")
}

pub fn comp_a() -> Address {
    Address::new("A")
}

pub fn comp_b() -> Address {
    Address::new("B")
}

pub fn usdc() -> Address {
    Address::new("USDC")
}

pub fn pool() -> Address {
    Address::new("pool-ab")
}

pub fn desk() -> Address {
    Address::new("desk")
}

pub struct World {
    pub engine: Engine,
    pub factory: BasketFactory,
    pub basket: Address,
    pub issuance: BasicIssuanceModule,
    pub trade: TradeModule,
    pub amm: AmmModule,
    pub fund: EtfFundModule,
}

impl World {
    pub fn new() -> Self {
        let mut engine = Engine::new(admin(), LedgerConfig::with_unit_scale(1)).expect("engine");
        let factory = BasketFactory::new(Address::new("factory"));
        engine.add_factory(&admin(), factory.address().clone()).unwrap();

        let issuance = BasicIssuanceModule::new(Address::new("mod-issuance"));
        let trade = TradeModule::new(Address::new("mod-trade"));
        let amm = AmmModule::new(Address::new("mod-amm"));
        let fund = EtfFundModule::new(Address::new("mod-fund"), usdc());
        for module in [issuance.address(), trade.address(), amm.address(), fund.address()] {
            engine.add_module(&admin(), module.clone()).unwrap();
        }

        engine.fund(&admin(), &comp_a(), &pool(), POOL_RESERVE).unwrap();
        engine.fund(&admin(), &comp_b(), &pool(), POOL_RESERVE).unwrap();
        engine.fund(&admin(), &pool(), &Address::new("lp-seed"), POOL_RESERVE).unwrap();
        engine.fund(&admin(), &comp_a(), &desk(), 1_000_000).unwrap();
        engine.fund(&admin(), &comp_b(), &desk(), 1_000_000).unwrap();

        let cpamm = ConstantProductVenue::new(
            "cpamm",
            30,
            vec![PoolConfig {
                address: pool(),
                token_a: comp_a(),
                token_b: comp_b(),
            }],
        )
        .unwrap();
        for module in [trade.address(), amm.address(), fund.address()] {
            engine
                .bind_integration(&admin(), module.clone(), "cpamm", Arc::new(cpamm.clone()))
                .unwrap();
        }
        let desk_venue = FixedRateVenue::new(
            "desk",
            desk(),
            vec![
                RateConfig {
                    source: usdc(),
                    destination: comp_a(),
                    rate: PRECISE_UNIT,
                },
                RateConfig {
                    source: usdc(),
                    destination: comp_b(),
                    rate: PRECISE_UNIT,
                },
            ],
        );
        engine
            .bind_integration(&admin(), fund.address().clone(), "desk", Arc::new(desk_venue))
            .unwrap();

        let basket = factory
            .create(
                &mut engine,
                BasketRequest {
                    components: vec![comp_a(), comp_b()],
                    units: vec![10, 5],
                    modules: vec![
                        issuance.address().clone(),
                        trade.address().clone(),
                        amm.address().clone(),
                        fund.address().clone(),
                    ],
                    share_split: vec![2, 1],
                    manager: manager(),
                    name: "Alpha Basket".into(),
                    symbol: "ALPHA".into(),
                },
            )
            .expect("create basket");

        issuance.initialize(&mut engine, &manager(), &basket).unwrap();
        trade.initialize(&mut engine, &manager(), &basket).unwrap();
        amm.initialize(&mut engine, &manager(), &basket).unwrap();
        fund.initialize(&mut engine, &manager(), &basket).unwrap();

        engine.fund(&admin(), &comp_a(), &alice(), 10_000).unwrap();
        engine.fund(&admin(), &comp_b(), &alice(), 10_000).unwrap();
        engine.fund(&admin(), &usdc(), &alice(), 100_000).unwrap();

        Self {
            engine,
            factory,
            basket,
            issuance,
            trade,
            amm,
            fund,
        }
    }

    /// Approves the issuance module for alice and issues `quantity` shares
    /// back to alice.
    pub fn issue(&mut self, quantity: u128) {
        for component in [comp_a(), comp_b()] {
            self.engine
                .approve(&alice(), &component, self.issuance.address(), u128::MAX);
        }
        self.issuance
            .issue(&mut self.engine, &alice(), &self.basket, quantity, &alice())
            .expect("issue");
    }

    pub fn units(&self) -> (i128, i128) {
        let basket = self.engine.basket(&self.basket).unwrap();
        (basket.default_unit(&comp_a()), basket.default_unit(&comp_b()))
    }
}
