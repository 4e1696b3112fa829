use common::IdempotencyKey;
use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use saga::{
    CancelSignal, CreateOrderRequest, InMemoryInventoryService, InMemoryPaymentService,
    SagaCoordinator,
};
use store::InMemoryStore;

type BenchCoordinator =
    SagaCoordinator<InMemoryStore, InMemoryInventoryService, InMemoryPaymentService>;

fn coordinator() -> BenchCoordinator {
    SagaCoordinator::new(
        InMemoryStore::new(),
        InMemoryInventoryService::with_default_stock(u32::MAX),
        InMemoryPaymentService::new(),
    )
}

fn request(product: &str) -> CreateOrderRequest {
    CreateOrderRequest::new("user-bench", product, Decimal::new(1999, 2))
}

fn bench_happy_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator();

    c.bench_function("saga/create_order_happy_path", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .create_order(request("SKU-BENCH"), CancelSignal::never())
                    .await
            })
        });
    });
}

fn bench_full_compensation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator();

    c.bench_function("saga/create_order_full_compensation", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .create_order(request("fail-me"), CancelSignal::never())
                    .await
            })
        });
    });
}

fn bench_idempotent_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator();
    let key = IdempotencyKey::parse("bench-key").unwrap();
    rt.block_on(async {
        coordinator
            .create_order(
                request("SKU-BENCH").with_idempotency_key(key.clone()),
                CancelSignal::never(),
            )
            .await
    });

    c.bench_function("saga/idempotent_replay", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .create_order(
                        request("SKU-BENCH").with_idempotency_key(key.clone()),
                        CancelSignal::never(),
                    )
                    .await
            })
        });
    });
}

criterion_group!(
    benches,
    bench_happy_path,
    bench_full_compensation,
    bench_idempotent_replay,
);
criterion_main!(benches);
