#![recursion_limit = "256"]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use finalization_engine::config::FinalizationSettings;
use finalization_engine::gateway::{GatewayPaymentStatus, GatewayVerification, WebhookVerifier};
use finalization_engine::idempotency::{IdempotencyGuard, TicketCodeGenerator};
use finalization_engine::models::OrderMetadata;
use finalization_engine::repositories::InMemoryOrderStore;
use finalization_engine::services::{OrderAssembler, PersistenceCoordinator};

fn metadata(quantity: u32) -> serde_json::Value {
    json!({
        "customer": {"name": "Bench Buyer", "email": "bench@example.com"},
        "items": [
            {"event_id": "evt-1", "event_title": "Bench Fest", "tier_name": "Regular", "quantity": quantity, "unit_price": "1000"}
        ],
        "totals": {"subtotal": "1000", "fee": "0", "vat": "0", "total": "1000"},
        "expected_amount": 100000 * quantity as i64,
        "currency": "NGN"
    })
}

fn verification(reference: &str, quantity: u32) -> GatewayVerification {
    GatewayVerification {
        reference: reference.to_string(),
        status: GatewayPaymentStatus::Success,
        amount: 100000 * quantity as i64,
        currency: "NGN".to_string(),
        metadata: metadata(quantity),
        paid_at: None,
        channel: None,
    }
}

fn benchmark_ticket_codes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ticket_code");
    let generator = TicketCodeGenerator::default();

    group.bench_function("generate", |b| {
        let mut index = 0u32;
        b.iter(|| {
            index = index % 1000 + 1;
            black_box(generator.generate(black_box("TIX_BENCH_REFERENCE"), index))
        });
    });

    group.finish();
}

fn benchmark_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    let assembler = OrderAssembler::default();

    for quantity in [1u32, 10, 100].iter() {
        let verification = verification("TIX_BENCH", *quantity);
        let parsed = OrderMetadata::from_gateway_value(&verification.metadata).unwrap();

        group.bench_with_input(
            BenchmarkId::new("assemble", quantity),
            quantity,
            |b, _| b.iter(|| black_box(assembler.assemble(&verification, &parsed))),
        );
    }

    group.bench_function("decode_metadata", |b| {
        let raw = metadata(4);
        b.iter(|| black_box(OrderMetadata::from_gateway_value(black_box(&raw))))
    });

    group.finish();
}

fn benchmark_webhook_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("webhook");
    let verifier = WebhookVerifier::new("sk_bench_secret");
    let body = json!({"event": "charge.success", "data": verification("TIX_BENCH", 3)})
        .to_string()
        .into_bytes();
    let signature = verifier.sign(&body).unwrap();

    group.bench_function("verify_signature", |b| {
        b.iter(|| black_box(verifier.verify(black_box(&body), &signature)))
    });

    group.finish();
}

fn benchmark_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.measurement_time(Duration::from_secs(10));
    let runtime = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("in_memory_finalize", |b| {
        let store = Arc::new(InMemoryOrderStore::new());
        let guard = Arc::new(IdempotencyGuard::new(store.clone(), &FinalizationSettings::default()));
        let coordinator = PersistenceCoordinator::new(store, guard, OrderAssembler::default());
        let assembler = OrderAssembler::default();
        let mut n = 0u64;

        b.to_async(&runtime).iter(|| {
            n += 1;
            let reference = format!("TIX_BENCH_{}", n);
            let verification = verification(&reference, 3);
            let parsed = OrderMetadata::from_gateway_value(&verification.metadata).unwrap();
            let (order, tickets) = assembler.assemble(&verification, &parsed).unwrap();
            let coordinator = &coordinator;
            async move { black_box(coordinator.commit(order, tickets).await) }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_ticket_codes,
    benchmark_assembly,
    benchmark_webhook_signature,
    benchmark_commit
);
criterion_main!(benches);
