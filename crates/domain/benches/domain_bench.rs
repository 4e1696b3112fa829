use common::{CorrelationId, OrderId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, NewSagaLogEntry, Order, OrderStatus, ProductId, StepStatus, UserId};
use rust_decimal::Decimal;

fn new_order() -> Order {
    Order::new(
        UserId::new("user-bench"),
        ProductId::new("SKU-BENCH"),
        Money::from_cents(1999).unwrap(),
        1,
    )
    .unwrap()
}

fn bench_create_order(c: &mut Criterion) {
    c.bench_function("domain/create_order", |b| {
        b.iter(new_order);
    });
}

fn bench_full_status_cycle(c: &mut Criterion) {
    c.bench_function("domain/full_status_cycle", |b| {
        b.iter(|| {
            let mut order = new_order();
            order.transition_to(OrderStatus::InventoryReserved).unwrap();
            order.record_payment("PAY-0001").unwrap();
            order.transition_to(OrderStatus::Completed).unwrap();
            order
        });
    });
}

fn bench_order_json_roundtrip(c: &mut Criterion) {
    let order = new_order();

    c.bench_function("domain/order_json_roundtrip", |b| {
        b.iter(|| {
            let json = serde_json::to_string(&order).unwrap();
            let back: Order = serde_json::from_str(&json).unwrap();
            back
        });
    });
}

fn bench_money_from_string(c: &mut Criterion) {
    c.bench_function("domain/money_from_string", |b| {
        b.iter(|| {
            let amount: Decimal = "12345.67".parse().unwrap();
            Money::new(amount).unwrap()
        });
    });
}

fn bench_log_entry(c: &mut Criterion) {
    let saga_id = OrderId::new();
    let correlation_id = CorrelationId::generate();

    c.bench_function("domain/log_entry", |b| {
        b.iter(|| {
            NewSagaLogEntry::new(saga_id, "CreateOrder", "PaymentCompleted", StepStatus::Completed)
                .with_correlation_id(correlation_id.clone())
                .with_payload(serde_json::json!({ "payment_id": "PAY-0001" }))
                .into_entry(1)
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_full_status_cycle,
    bench_order_json_roundtrip,
    bench_money_from_string,
    bench_log_entry,
);
criterion_main!(benches);
