use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InMemoryProductRepository, LedgerConfig, Money, StockLedger};

fn bench_create_product(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = StockLedger::new(InMemoryProductRepository::new(), LedgerConfig::default());

    c.bench_function("ledger/create_product", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .create_product("Bench".to_string(), Money::from_cents(100), 10)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_cancel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = StockLedger::new(InMemoryProductRepository::new(), LedgerConfig::default());
    let id = rt.block_on(async {
        ledger
            .create_product("Bench".to_string(), Money::from_cents(100), 1_000)
            .await
            .unwrap()
            .id()
    });

    c.bench_function("ledger/reserve_then_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.reserve_stock(id, 5).await.unwrap();
                ledger.cancel_reservation(id, 5).await.unwrap();
            });
        });
    });
}

fn bench_reserve_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/reserve_then_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger =
                    StockLedger::new(InMemoryProductRepository::new(), LedgerConfig::default());
                let id = ledger
                    .create_product("Bench".to_string(), Money::from_cents(100), 10)
                    .await
                    .unwrap()
                    .id();
                ledger.reserve_stock(id, 3).await.unwrap();
                ledger.confirm_reservation(id, 3).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_product,
    bench_reserve_cancel,
    bench_reserve_confirm
);
criterion_main!(benches);
