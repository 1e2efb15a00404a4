//! Manager trades between default positions.

mod common;

use std::sync::Arc;

use common::*;
use trove_modules::{Module, ModuleError, TradeParams};
use trove_protocol::adapter::{Adapter, CallData, Intent, Invocation, Quote, TokenFlow};
use trove_protocol::{Address, Engine, LedgerError};

fn params(source_unit: u128, min_destination_unit: u128) -> TradeParams {
    TradeParams {
        integration: "cpamm".into(),
        source: comp_a(),
        destination: comp_b(),
        source_unit,
        min_destination_unit,
    }
}

/// Venue that spends `extra` more than asked and delivers a fixed amount,
/// from a funded sink account.
#[derive(Debug)]
struct RiggedVenue {
    extra: u128,
    delivery: u128,
}

impl Adapter for RiggedVenue {
    fn name(&self) -> &str {
        "rigged"
    }

    fn quote(&self, _: &Engine, _: &Address, intent: &Intent) -> Result<Quote, LedgerError> {
        let Intent::Swap {
            source,
            destination,
            source_amount,
            ..
        } = intent
        else {
            return Err(LedgerError::AdapterFailure("swaps only".into()));
        };
        Ok(Quote {
            expected: vec![
                TokenFlow::outflow(source.clone(), *source_amount)?,
                TokenFlow::inflow(destination.clone(), self.delivery)?,
            ],
            call_data: CallData::encode(&(source, destination, source_amount))?,
        })
    }

    fn execute(&self, inv: &mut Invocation<'_>, call: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
        let (source, destination, amount): (Address, Address, u128) = call.decode()?;
        let sink = Address::new("sink");
        inv.pull(&source, &sink, amount + self.extra)?;
        inv.pay(&destination, &sink, self.delivery)?;
        Ok(Vec::new())
    }
}

fn bind_rigged(world: &mut World, extra: u128, delivery: u128) {
    world
        .engine
        .fund(&admin(), &comp_b(), &Address::new("sink"), 10_000)
        .unwrap();
    world
        .engine
        .bind_integration(
            &admin(),
            world.trade.address().clone(),
            "rigged",
            Arc::new(RiggedVenue { extra, delivery }),
        )
        .unwrap();
}

#[test]
fn trade_recomputes_units_from_balances() {
    let mut world = World::new();
    world.issue(100);

    let receipt = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &params(2, 1))
        .unwrap();

    // 200 A in, 0.3% fee, against 100k/100k reserves.
    assert_eq!(receipt.spent, 200);
    assert_eq!(receipt.received, 198);
    assert_eq!(world.engine.balance_of(&comp_a(), &world.basket), 800);
    assert_eq!(world.engine.balance_of(&comp_b(), &world.basket), 698);
    // 698 / 100 shares floors to 6; the 98 remainder stays unaccounted.
    assert_eq!(world.units(), (8, 6));
    assert_eq!(world.engine.balance_of(&comp_a(), &pool()), POOL_RESERVE + 200);
}

#[test]
fn only_manager_trades() {
    let mut world = World::new();
    world.issue(100);
    let err = world
        .trade
        .trade(&mut world.engine, &alice(), &world.basket, &params(2, 1))
        .unwrap_err();
    assert!(matches!(err, ModuleError::NotManager { .. }));
}

#[test]
fn cannot_sell_more_than_the_position() {
    let mut world = World::new();
    world.issue(100);
    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &params(11, 0))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert_eq!(world.units(), (10, 5));
}

#[test]
fn empty_basket_cannot_trade() {
    let mut world = World::new();
    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &params(1, 0))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
}

#[test]
fn unknown_integration_is_reported() {
    let mut world = World::new();
    world.issue(100);
    let mut request = params(1, 0);
    request.integration = "UNKNOWN".into();
    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &request)
        .unwrap_err();
    assert_eq!(err.kind(), "UnknownIntegration");
}

#[test]
fn venue_minimum_failure_rolls_back() {
    let mut world = World::new();
    world.issue(100);
    let events = world.engine.events().next_sequence();
    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &params(2, 3))
        .unwrap_err();
    assert_eq!(err.kind(), "AdapterFailure");
    assert_eq!(world.engine.balance_of(&comp_a(), &world.basket), 1_000);
    assert_eq!(world.engine.events().next_sequence(), events);
}

#[test]
fn overspending_venue_fails_reconciliation() {
    let mut world = World::new();
    world.issue(100);
    bind_rigged(&mut world, 1, 300);
    let mut request = params(2, 1);
    request.integration = "rigged".into();

    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &request)
        .unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Ledger(LedgerError::SlippageOrReconciliation {
            expected: 200,
            actual: 201,
            ..
        })
    ));
    assert_eq!(world.engine.balance_of(&comp_a(), &world.basket), 1_000);
    assert_eq!(world.engine.balance_of(&comp_b(), &Address::new("sink")), 10_000);
}

#[test]
fn short_delivery_fails_minimum() {
    let mut world = World::new();
    world.issue(100);
    bind_rigged(&mut world, 0, 99);
    let mut request = params(2, 1);
    request.integration = "rigged".into();

    let err = world
        .trade
        .trade(&mut world.engine, &manager(), &world.basket, &request)
        .unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Ledger(LedgerError::SlippageOrReconciliation {
            expected: 100,
            actual: 99,
            ..
        })
    ));
    assert_eq!(world.units(), (10, 5));
}
