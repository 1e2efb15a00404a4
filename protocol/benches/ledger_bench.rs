// Ledger primitive benchmarks for the Trove kernel.
//
// Covers fixed-point position math, default-position edits on baskets of
// increasing size, and the cost of an atomic operation (which snapshots the
// whole ledger) as the number of baskets grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trove_protocol::config::PRECISE_UNIT;
use trove_protocol::math::{default_unit_after_change, precise_mul};
use trove_protocol::{Address, BasketFactory, BasketRequest, Engine, LedgerConfig, LedgerError};

fn admin() -> Address {
    Address::new("admin")
}

/// Engine with `baskets` baskets of `components` components each, all with
/// an initialized `issuance` module. Returns the engine and the first basket.
fn populated(baskets: usize, components: usize) -> (Engine, Address) {
    let mut engine = Engine::new(admin(), LedgerConfig::default()).expect("engine");
    engine.add_factory(&admin(), "factory".into()).unwrap();
    engine.add_module(&admin(), "issuance".into()).unwrap();
    let factory = BasketFactory::new("factory".into());

    let mut first = None;
    for _ in 0..baskets {
        let request = BasketRequest {
            components: (0..components).map(|i| Address::new(format!("ASSET-{i}"))).collect(),
            units: vec![PRECISE_UNIT as i128; components],
            modules: vec!["issuance".into()],
            share_split: Vec::new(),
            manager: "manager".into(),
            name: "Bench".into(),
            symbol: "BNCH".into(),
        };
        let basket = factory.create(&mut engine, request).unwrap();
        engine.initialize_module(&"issuance".into(), &basket).unwrap();
        first.get_or_insert(basket);
    }
    (engine, first.expect("at least one basket"))
}

fn bench_precise_mul(c: &mut Criterion) {
    let supply = 1_000_000 * PRECISE_UNIT;
    let unit = 3 * PRECISE_UNIT / 7;
    c.bench_function("math/precise_mul", |b| {
        b.iter(|| precise_mul(black_box(unit), black_box(supply), PRECISE_UNIT));
    });
}

fn bench_default_unit_after_change(c: &mut Criterion) {
    c.bench_function("math/default_unit_after_change", |b| {
        b.iter(|| {
            default_unit_after_change(
                black_box(1_000 * PRECISE_UNIT),
                black_box(2_000 * PRECISE_UNIT + 17),
                black_box(1_500 * PRECISE_UNIT),
                2 * PRECISE_UNIT as i128,
                PRECISE_UNIT,
            )
        });
    });
}

fn bench_edit_default_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("basket/edit_default_position");
    for components in [2usize, 16, 64] {
        let (mut engine, basket) = populated(1, components);
        let target = Address::new("ASSET-0");
        group.bench_with_input(BenchmarkId::from_parameter(components), &components, |b, _| {
            let mut unit = PRECISE_UNIT as i128;
            b.iter(|| {
                unit += 1;
                engine
                    .edit_default_position(&"issuance".into(), &basket, &target, unit)
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_operate_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/operate");
    for baskets in [1usize, 10, 100] {
        let (mut engine, basket) = populated(baskets, 8);
        group.bench_with_input(BenchmarkId::from_parameter(baskets), &baskets, |b, _| {
            b.iter(|| {
                engine
                    .operate(&"issuance".into(), &basket, |engine| {
                        engine.mint_shares(&"issuance".into(), &basket, &"holder".into(), 1)
                    })
                    .map_err(|e: LedgerError| e)
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_precise_mul,
    bench_default_unit_after_change,
    bench_edit_default_position,
    bench_operate_snapshot,
);
criterion_main!(benches);
