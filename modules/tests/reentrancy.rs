//! Venues that call back into the ledger mid-operation.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::*;
use trove_modules::{Module, TradeModule, TradeParams};
use trove_protocol::adapter::{Adapter, CallData, Intent, Invocation, Quote, TokenFlow};
use trove_protocol::{Address, Engine, LedgerError};

/// On execute, tries to mint shares as `minter` and to start a nested trade
/// as `trade`, recording how each attempt was refused.
#[derive(Debug)]
struct CallbackVenue {
    minter: Address,
    trade: TradeModule,
    attempts: Mutex<Vec<&'static str>>,
}

impl Adapter for CallbackVenue {
    fn name(&self) -> &str {
        "callback"
    }

    fn quote(&self, _: &Engine, _: &Address, _: &Intent) -> Result<Quote, LedgerError> {
        Ok(Quote {
            expected: Vec::new(),
            call_data: CallData::default(),
        })
    }

    fn execute(&self, inv: &mut Invocation<'_>, _: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
        let basket = inv.account().clone();

        let minted = inv
            .engine()
            .mint_shares(&self.minter, &basket, &Address::new("attacker"), 1_000);
        let nested = self.trade.trade(
            inv.engine(),
            &manager(),
            &basket,
            &TradeParams {
                integration: "cpamm".into(),
                source: comp_a(),
                destination: comp_b(),
                source_unit: 1,
                min_destination_unit: 0,
            },
        );

        let mut attempts = self.attempts.lock();
        attempts.push(minted.as_ref().map_or_else(|e| e.kind(), |_| "Ok"));
        attempts.push(nested.as_ref().map_or_else(|e| e.kind(), |_| "Ok"));
        minted?;
        Ok(Vec::new())
    }
}

fn bind_callback(world: &mut World) -> Arc<CallbackVenue> {
    let venue = Arc::new(CallbackVenue {
        minter: world.issuance.address().clone(),
        trade: world.trade.clone(),
        attempts: Mutex::new(Vec::new()),
    });
    world
        .engine
        .bind_integration(&admin(), world.trade.address().clone(), "callback", venue.clone())
        .unwrap();
    venue
}

fn callback_trade() -> TradeParams {
    TradeParams {
        integration: "callback".into(),
        source: comp_a(),
        destination: comp_b(),
        source_unit: 1,
        min_destination_unit: 0,
    }
}

#[test]
fn callbacks_from_any_module_are_refused() {
    let mut world = World::new();
    world.issue(100);
    let venue = bind_callback(&mut world);

    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &callback_trade())
        .unwrap_err();

    assert_eq!(err.kind(), "ReentrantCall");
    assert_eq!(*venue.attempts.lock(), vec!["ReentrantCall", "ReentrantCall"]);
    let basket = world.engine.basket(&world.basket).unwrap();
    assert_eq!(basket.total_supply(), 100);
    assert_eq!(basket.balance_of(&Address::new("attacker")), 0);
}

#[test]
fn lock_is_released_after_a_refused_callback() {
    let mut world = World::new();
    world.issue(100);
    bind_callback(&mut world);

    let _ = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &callback_trade());
    assert!(world.engine.basket(&world.basket).unwrap().locker().is_none());

    let receipt = world
        .trade
        .trade(
            &mut world.engine,
            &manager(),
            &world.basket,
            &TradeParams {
                integration: "cpamm".into(),
                source: comp_a(),
                destination: comp_b(),
                source_unit: 1,
                min_destination_unit: 0,
            },
        )
        .unwrap();
    assert_eq!(receipt.spent, 100);
}

#[test]
fn outside_callers_are_refused_while_locked() {
    let mut world = World::new();
    world.issue(100);

    // A manager-side edit attempted from inside a venue hits the same lock.
    #[derive(Debug)]
    struct ManagerEdit;

    impl Adapter for ManagerEdit {
        fn name(&self) -> &str {
            "manager-edit"
        }

        fn quote(&self, _: &Engine, _: &Address, _: &Intent) -> Result<Quote, LedgerError> {
            Ok(Quote {
                expected: Vec::new(),
                call_data: CallData::default(),
            })
        }

        fn execute(&self, inv: &mut Invocation<'_>, _: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
            let basket = inv.account().clone();
            inv.engine()
                .edit_default_position(&manager(), &basket, &comp_a(), 1_000)?;
            Ok(Vec::new())
        }
    }

    world
        .engine
        .bind_integration(&admin(), world.trade.address().clone(), "edit", Arc::new(ManagerEdit))
        .unwrap();
    let mut params = callback_trade();
    params.integration = "edit".into();
    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &params)
        .unwrap_err();
    assert_eq!(err.kind(), "ReentrantCall");
    assert_eq!(world.units(), (10, 5));
}
