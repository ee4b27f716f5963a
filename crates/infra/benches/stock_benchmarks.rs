use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use stockcore_core::{LotId, ProductId, UserId, WarehouseId};
use stockcore_infra::{InMemoryBatchRegistry, InMemoryInventoryService, InMemoryProductCatalog, InventoryConfig};
use stockcore_inventory::{Lot, ReceiveStock, ShipWithFefo};

struct Bench {
    service: InMemoryInventoryService,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    actor_id: UserId,
}

/// A service with one product spread over `lots` lots with staggered expiry.
fn stocked(lots: usize, per_lot: i64) -> Bench {
    let products = Arc::new(InMemoryProductCatalog::new());
    let registry = Arc::new(InMemoryBatchRegistry::new());
    let service = InMemoryInventoryService::in_memory(
        products.clone(),
        registry.clone(),
        InventoryConfig::default(),
    );
    let product_id = ProductId::new();
    let warehouse_id = WarehouseId::new();
    let actor_id = UserId::new();
    products.register(product_id).unwrap();

    let today = Utc::now().date_naive();
    for i in 0..lots {
        let lot_id = LotId::new();
        registry
            .register(Lot {
                lot_id,
                product_id,
                manufacture_date: None,
                expiry_date: Some(today + Duration::days(((i * 7) % 365) as i64 + 1)),
                supplier: None,
                purchase_price: None,
            })
            .unwrap();
        service
            .receive(&ReceiveStock {
                product_id,
                warehouse_id,
                lot_id: Some(lot_id),
                cell_id: None,
                quantity: Decimal::from(per_lot),
                actor_id,
                notes: None,
            })
            .unwrap();
    }

    Bench {
        service,
        product_id,
        warehouse_id,
        actor_id,
    }
}

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release");
    group.throughput(Throughput::Elements(2));

    for lots in [1usize, 10, 100] {
        let bench = stocked(lots, 1_000);
        let qty = Decimal::from(5);
        group.bench_with_input(BenchmarkId::from_parameter(lots), &lots, |b, _| {
            b.iter(|| {
                bench
                    .service
                    .reserve(bench.product_id, bench.warehouse_id, black_box(qty), bench.actor_id)
                    .unwrap();
                bench
                    .service
                    .release(bench.product_id, bench.warehouse_id, black_box(qty), bench.actor_id)
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_fefo_shipment(c: &mut Criterion) {
    let mut group = c.benchmark_group("fefo_shipment");

    for lots in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(lots), &lots, |b, &lots| {
            b.iter_batched(
                || stocked(lots, 10),
                |bench| {
                    // Drains roughly half the lots.
                    let quantity = Decimal::from((lots as i64 * 10) / 2 + 1);
                    bench
                        .service
                        .ship_with_fefo(&ShipWithFefo {
                            product_id: bench.product_id,
                            warehouse_id: bench.warehouse_id,
                            quantity: black_box(quantity),
                            actor_id: bench.actor_id,
                            notes: None,
                        })
                        .unwrap()
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reserve_release, bench_fefo_shipment);
criterion_main!(benches);
