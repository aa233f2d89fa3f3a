//! Benchmarks for book and merge engine operations.
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use book_sync::engine::MergeEngine;
use book_sync::orderbook::{BookSide, BookState, BookStore};
use book_sync::types::{LevelUpdate, Price, Quantity, Symbol, Trade, TradeSide, WireMessage};

fn populated(size: i64) -> BookState {
    let mut book = BookState::new();
    for i in 1..=size {
        book.set_ask(Price::from(1000 + i), Quantity::from(100));
        book.set_bid(Price::from(1000 - i), Quantity::from(100));
    }
    book
}

fn bench_apply_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_apply_level");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut book = populated(size);
            let price = Price::from(1000 + size / 2);
            let mut qty = 1i64;

            b.iter(|| {
                qty = qty % 50 + 1;
                book.apply_level(black_box(BookSide::Ask), black_box(price), black_box(Quantity::from(qty)));
            });
        });
    }

    group.finish();
}

fn bench_deplete_and_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_trade_depletion");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let book = populated(size);
            let price = Price::from(1001);

            b.iter(|| {
                let mut book = book.clone();
                book.deplete(BookSide::Ask, black_box(price), black_box(Quantity::from(30)));
                black_box(book.purge_inside(price));
            });
        });
    }

    group.finish();
}

fn bench_best_prices(c: &mut Criterion) {
    let book = populated(50);

    c.bench_function("book_spread", |b| {
        b.iter(|| {
            black_box(book.spread());
        });
    });
}

fn bench_engine_diff(c: &mut Criterion) {
    let store = Arc::new(BookStore::new());
    let engine = MergeEngine::new(store, 100);
    let symbol: Symbol = "BTC/USDT".parse().unwrap();

    let asks: Vec<LevelUpdate> = (1..=100).map(|i| LevelUpdate::new(Price::from(1000 + i), 100.into())).collect();
    let bids: Vec<LevelUpdate> = (1..=100).map(|i| LevelUpdate::new(Price::from(1000 - i), 100.into())).collect();
    engine
        .apply(&WireMessage::snapshot("bench", symbol.clone(), 0, asks, bids))
        .unwrap();

    let mut qty = 1i64;
    c.bench_function("engine_diff", |b| {
        b.iter(|| {
            qty = qty % 50 + 1;
            let msg = WireMessage::diff(
                "bench",
                symbol.clone(),
                0,
                vec![LevelUpdate::new(Price::from(1005), Quantity::from(qty))],
                vec![LevelUpdate::new(Price::from(995), Quantity::from(qty))],
            );
            black_box(engine.apply(&msg).unwrap());
        });
    });
}

fn bench_engine_trades(c: &mut Criterion) {
    let store = Arc::new(BookStore::new());
    let engine = MergeEngine::new(store, 100);
    let symbol: Symbol = "BTC/USDT".parse().unwrap();
    let mut seq = 0i64;

    // Deep enough that the level survives every iteration.
    engine
        .apply(&WireMessage::snapshot(
            "bench",
            symbol.clone(),
            0,
            vec![LevelUpdate::new(Price::from(1001), Quantity::from(1_000_000_000_000i64))],
            vec![LevelUpdate::new(Price::from(999), Quantity::from(100))],
        ))
        .unwrap();

    c.bench_function("engine_trades", |b| {
        b.iter(|| {
            seq += 1;
            let trade = Trade {
                price: Price::from(1001),
                quantity: Quantity::from(1),
                side: TradeSide::Sell,
                sequence_id: seq,
                timestamp_ms: 0,
            };
            black_box(engine.apply(&WireMessage::trades("bench", symbol.clone(), vec![trade])).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_apply_level,
    bench_deplete_and_purge,
    bench_best_prices,
    bench_engine_diff,
    bench_engine_trades
);
criterion_main!(benches);
