//! Integration tests for the full operation pipeline.
//!
//! Tests: request → InventoryService → Ledger → OperationLog
//!
//! Verifies:
//! - FEFO shipments draw the right lots and log one grouped entry per lot
//! - Failed operations leave neither ledger nor log changed
//! - Reconciliation writes counted quantities back through ADJUSTMENT entries
//! - Concurrent reservations and shipments never over-promise
//! - A log that refuses an append leaves the ledger where it was

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use stockcore_core::{CellId, DomainError, LotId, OperationId, ProductId, UserId, WarehouseId};
    use stockcore_inventory::{
        AdjustStock, InventoryStatus, Lot, OperationLogEntry, OperationType, ReceiveStock,
        SessionStatus, ShipStock, ShipWithFefo,
    };

    use crate::catalog::{InMemoryBatchRegistry, InMemoryProductCatalog};
    use crate::config::InventoryConfig;
    use crate::ledger::InMemoryLedgerStore;
    use crate::operation_log::{
        InMemoryOperationLog, LogFilter, OperationLog, OperationLogError, export_json_lines,
    };
    use crate::service::{InMemoryInventoryService, InventoryService};

    struct Fixture {
        service: InMemoryInventoryService,
        products: Arc<InMemoryProductCatalog>,
        lots: Arc<InMemoryBatchRegistry>,
        actor: UserId,
        warehouse: WarehouseId,
    }

    fn setup_with(config: InventoryConfig) -> Fixture {
        let products = Arc::new(InMemoryProductCatalog::new());
        let lots = Arc::new(InMemoryBatchRegistry::new());
        let service = InMemoryInventoryService::in_memory(products.clone(), lots.clone(), config);
        Fixture {
            service,
            products,
            lots,
            actor: UserId::new(),
            warehouse: WarehouseId::new(),
        }
    }

    fn setup() -> Fixture {
        setup_with(InventoryConfig::default())
    }

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    impl Fixture {
        fn product(&self) -> ProductId {
            let product_id = ProductId::new();
            self.products.register(product_id).unwrap();
            product_id
        }

        fn lot(&self, product_id: ProductId, expiry_date: Option<NaiveDate>) -> LotId {
            let lot_id = LotId::new();
            self.lots
                .register(Lot {
                    lot_id,
                    product_id,
                    manufacture_date: None,
                    expiry_date,
                    supplier: None,
                    purchase_price: None,
                })
                .unwrap();
            lot_id
        }

        fn receive(&self, product_id: ProductId, lot_id: Option<LotId>, qty: i64) {
            self.receive_into(product_id, self.warehouse, lot_id, None, qty);
        }

        fn receive_into(
            &self,
            product_id: ProductId,
            warehouse_id: WarehouseId,
            lot_id: Option<LotId>,
            cell_id: Option<CellId>,
            qty: i64,
        ) {
            self.service
                .receive(&ReceiveStock {
                    product_id,
                    warehouse_id,
                    lot_id,
                    cell_id,
                    quantity: d(qty),
                    actor_id: self.actor,
                    notes: None,
                })
                .unwrap();
        }

        fn fefo(&self, product_id: ProductId, qty: i64) -> ShipWithFefo {
            ShipWithFefo {
                product_id,
                warehouse_id: self.warehouse,
                quantity: d(qty),
                actor_id: self.actor,
                notes: Some("order 1042".to_string()),
            }
        }
    }

    #[test]
    fn receipt_creates_record_and_logs_entry() {
        let fx = setup();
        let product = fx.product();
        let cell = CellId::new();
        fx.receive_into(product, fx.warehouse, None, Some(cell), 100);

        let level = fx.service.stock_level(product, fx.warehouse).unwrap();
        assert_eq!(level.quantity, d(100));
        assert_eq!(level.reserved_quantity, d(0));
        assert_eq!(level.available, d(100));

        let entries = fx.service.operations(&LogFilter::product(product)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, OperationType::Receipt);
        assert_eq!(entries[0].quantity, d(100));
        assert_eq!(entries[0].to_cell, Some(cell));
    }

    #[test]
    fn fefo_shipment_draws_soonest_expiry_first() {
        let fx = setup();
        let product = fx.product();
        let lot_a = fx.lot(product, Some(today() + Duration::days(90)));
        let lot_b = fx.lot(product, Some(today() + Duration::days(10)));
        let lot_c = fx.lot(product, None);
        fx.receive(product, Some(lot_a), 5);
        fx.receive(product, Some(lot_b), 5);
        fx.receive(product, Some(lot_c), 5);

        let receipt = fx.service.ship_with_fefo(&fx.fefo(product, 7)).unwrap();

        let drawn: Vec<_> = receipt
            .allocations
            .iter()
            .map(|a| (a.lot_id, a.quantity))
            .collect();
        assert_eq!(drawn, vec![(Some(lot_b), d(5)), (Some(lot_a), d(2))]);

        let level = fx.service.stock_level(product, fx.warehouse).unwrap();
        assert_eq!(level.quantity, d(8));

        let shipped = fx
            .service
            .operations(&LogFilter::group(receipt.group_id))
            .unwrap();
        assert_eq!(shipped.len(), 2);
        assert!(shipped.iter().all(|e| e.operation_type == OperationType::Shipment));
        assert!(shipped.iter().all(|e| e.quantity < Decimal::ZERO));
        assert_eq!(shipped[0].expiry_date, Some(today() + Duration::days(10)));
        assert_eq!(shipped[0].notes.as_deref(), Some("order 1042"));
        assert_eq!(receipt.operation_ids.len(), 2);
    }

    #[test]
    fn insufficient_stock_changes_nothing() {
        let fx = setup();
        let product = fx.product();
        let lot = fx.lot(product, Some(today() + Duration::days(5)));
        fx.receive(product, Some(lot), 10);
        let logged = fx.service.log().len();

        let err = fx.service.ship_with_fefo(&fx.fefo(product, 20)).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientStock { requested, available }
                if requested == d(20) && available == d(10)
        ));

        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(10));
        assert_eq!(fx.service.log().len(), logged);
    }

    #[test]
    fn reservations_reduce_what_can_be_shipped() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 10);
        fx.service.reserve(product, fx.warehouse, d(8), fx.actor).unwrap();

        let err = fx
            .service
            .ship(&ShipStock {
                product_id: product,
                warehouse_id: fx.warehouse,
                cell_id: None,
                quantity: d(3),
                actor_id: fx.actor,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));

        fx.service.release(product, fx.warehouse, d(8), fx.actor).unwrap();
        let level = fx.service.stock_level(product, fx.warehouse).unwrap();
        assert_eq!(level.reserved_quantity, d(0));
        assert_eq!(level.available, d(10));

        let err = fx
            .service
            .release(product, fx.warehouse, d(1), fx.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn reservations_are_logged_only_when_enabled() {
        let quiet = setup();
        let product = quiet.product();
        quiet.receive(product, None, 10);
        quiet.service.reserve(product, quiet.warehouse, d(4), quiet.actor).unwrap();
        let filter = LogFilter::product(product).of_type(OperationType::Reservation);
        assert!(quiet.service.operations(&filter).unwrap().is_empty());

        let verbose = setup_with(InventoryConfig {
            log_reservations: true,
            ..InventoryConfig::default()
        });
        let product = verbose.product();
        verbose.receive(product, None, 10);
        verbose.service.reserve(product, verbose.warehouse, d(4), verbose.actor).unwrap();
        verbose.service.release(product, verbose.warehouse, d(1), verbose.actor).unwrap();
        let filter = LogFilter::product(product).of_type(OperationType::Reservation);
        let quantities: Vec<_> = verbose
            .service
            .operations(&filter)
            .unwrap()
            .iter()
            .map(|e| e.quantity)
            .collect();
        assert_eq!(quantities, vec![d(4), d(-1)]);
    }

    #[test]
    fn concurrent_reservations_never_exceed_quantity() {
        let fx = Arc::new(setup());
        let product = fx.product();
        fx.receive(product, None, 100);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let fx = fx.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    fx.service.reserve(product, fx.warehouse, d(60), fx.actor)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(DomainError::InsufficientStock { .. }))));
        let level = fx.service.stock_level(product, fx.warehouse).unwrap();
        assert_eq!(level.reserved_quantity, d(60));
    }

    #[test]
    fn unknown_product_is_rejected() {
        let fx = setup();
        let err = fx
            .service
            .receive(&ReceiveStock {
                product_id: ProductId::new(),
                warehouse_id: fx.warehouse,
                lot_id: None,
                cell_id: None,
                quantity: d(1),
                actor_id: fx.actor,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "product", .. }));
        assert!(fx.service.log().is_empty());
    }

    #[test]
    fn lot_must_belong_to_product() {
        let fx = setup();
        let product = fx.product();
        let other = fx.product();
        let foreign_lot = fx.lot(other, None);

        let err = fx
            .service
            .receive(&ReceiveStock {
                product_id: product,
                warehouse_id: fx.warehouse,
                lot_id: Some(foreign_lot),
                cell_id: None,
                quantity: d(1),
                actor_id: fx.actor,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 5);

        assert!(matches!(
            fx.service.ship_with_fefo(&fx.fefo(product, 0)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            fx.service.reserve(product, fx.warehouse, d(-1), fx.actor),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn manual_adjustment_logs_before_and_after() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 12);

        let operation_id = fx
            .service
            .adjust(&AdjustStock {
                product_id: product,
                warehouse_id: fx.warehouse,
                lot_id: None,
                new_quantity: d(9),
                actor_id: fx.actor,
                notes: Some("damaged pallet".to_string()),
            })
            .unwrap();

        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(9));
        let adjustments = fx
            .service
            .operations(&LogFilter::product(product).of_type(OperationType::Adjustment))
            .unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].operation_id, operation_id);
        assert_eq!(adjustments[0].quantity, d(-3));
        assert_eq!(adjustments[0].notes.as_deref(), Some("12 -> 9: damaged pallet"));
    }

    #[test]
    fn reconciliation_writes_counted_quantity_back() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 100);

        let session_id = fx
            .service
            .start_inventory(fx.warehouse, fx.actor, Some("quarterly".to_string()))
            .unwrap();
        let count = fx
            .service
            .record_actual_count(session_id, product, None, None, d(95), None)
            .unwrap();
        assert_eq!(count.expected_quantity, d(100));
        assert_eq!(count.discrepancy(), Some(d(-5)));

        let summary = fx.service.complete_inventory(session_id, fx.actor).unwrap();
        assert_eq!(summary.total_records, 1);
        assert_eq!(summary.discrepancies_count, 1);
        assert_eq!(summary.discrepancies[0].discrepancy, d(-5));
        assert_eq!(summary.discrepancies[0].quantity_before, d(100));
        assert_eq!(summary.discrepancies[0].quantity_after, d(95));

        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(95));
        let adjustments = fx
            .service
            .operations(&LogFilter::product(product).of_type(OperationType::Adjustment))
            .unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].quantity, d(-5));
        assert!(adjustments[0].group_id.is_some());

        let session = fx.service.get_session(session_id).unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.completed_by(), Some(fx.actor));
    }

    #[test]
    fn one_open_session_per_warehouse() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 1);
        let other_warehouse = WarehouseId::new();

        let first = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        let err = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        fx.service.start_inventory(other_warehouse, fx.actor, None).unwrap();

        fx.service.cancel_inventory(first).unwrap();
        fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        assert_eq!(fx.service.sessions_for_warehouse(fx.warehouse).unwrap().len(), 2);
    }

    #[test]
    fn re_recording_a_count_keeps_the_latest_value() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 40);
        let session_id = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();

        fx.service
            .record_actual_count(session_id, product, None, None, d(30), None)
            .unwrap();
        fx.service
            .record_actual_count(session_id, product, None, None, d(38), None)
            .unwrap();

        let counts = fx.service.count_records(session_id).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].actual_quantity, Some(d(38)));
    }

    #[test]
    fn cancelled_session_leaves_ledger_untouched() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 20);
        let session_id = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        fx.service
            .record_actual_count(session_id, product, None, None, d(3), None)
            .unwrap();
        let logged = fx.service.log().len();

        fx.service.cancel_inventory(session_id).unwrap();

        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(20));
        assert_eq!(fx.service.log().len(), logged);
        assert!(matches!(
            fx.service.complete_inventory(session_id, fx.actor),
            Err(DomainError::InvalidState(_))
        ));
        assert!(matches!(
            fx.service.record_actual_count(session_id, product, None, None, d(1), None),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn unfilled_counts_are_skipped_on_completion() {
        let fx = setup();
        let counted = fx.product();
        let skipped = fx.product();
        fx.receive(counted, None, 10);
        fx.receive(skipped, None, 10);
        let session_id = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        fx.service
            .record_actual_count(session_id, counted, None, None, d(12), None)
            .unwrap();

        let summary = fx.service.complete_inventory(session_id, fx.actor).unwrap();
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.unfilled_records, 1);
        assert_eq!(summary.discrepancies_count, 1);
        assert_eq!(fx.service.stock_level(skipped, fx.warehouse).unwrap().quantity, d(10));
        assert_eq!(fx.service.stock_level(counted, fx.warehouse).unwrap().quantity, d(12));
    }

    #[test]
    fn count_below_reservation_blocks_completion() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 10);
        fx.service.reserve(product, fx.warehouse, d(6), fx.actor).unwrap();
        let session_id = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        fx.service
            .record_actual_count(session_id, product, None, None, d(4), None)
            .unwrap();

        let err = fx.service.complete_inventory(session_id, fx.actor).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(10));
        assert!(fx.service.get_session(session_id).unwrap().is_in_progress());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let fx = setup();
        let err = fx
            .service
            .get_session(stockcore_core::SessionId::new())
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "session", .. }));
    }

    #[test]
    fn expiring_stock_lists_lots_within_horizon() {
        let fx = setup_with(InventoryConfig {
            expiry_warning_days: 14,
            ..InventoryConfig::default()
        });
        let product = fx.product();
        let expired = fx.lot(product, Some(today() - Duration::days(2)));
        let soon = fx.lot(product, Some(today() + Duration::days(7)));
        let later = fx.lot(product, Some(today() + Duration::days(60)));
        fx.receive(product, Some(soon), 3);
        fx.receive(product, Some(expired), 3);
        fx.receive(product, Some(later), 3);

        let expiring = fx.service.expiring_stock(fx.warehouse, today()).unwrap();
        let lots: Vec<_> = expiring.iter().map(|e| (e.lot.lot_id, e.days_until_expiry)).collect();
        assert_eq!(lots, vec![(expired, -2), (soon, 7)]);
    }

    #[test]
    fn expired_lots_are_still_shipped_and_flagged() {
        let fx = setup();
        let product = fx.product();
        let expired = fx.lot(product, Some(today() - Duration::days(1)));
        fx.receive(product, Some(expired), 4);

        let receipt = fx.service.ship_with_fefo(&fx.fefo(product, 4)).unwrap();
        assert_eq!(receipt.allocations.len(), 1);
        assert!(receipt.allocations[0].expired);
    }

    #[test]
    fn queries_only_return_records_with_stock() {
        let fx = setup();
        let product = fx.product();
        let cell = CellId::new();
        fx.receive_into(product, fx.warehouse, None, Some(cell), 5);
        fx.receive_into(product, WarehouseId::new(), None, None, 2);

        assert_eq!(fx.service.get_by_product(product).unwrap().len(), 2);
        assert_eq!(fx.service.get_by_warehouse(fx.warehouse).unwrap().len(), 1);
        assert_eq!(fx.service.get_by_cell(cell).unwrap().len(), 1);

        fx.service
            .ship(&ShipStock {
                product_id: product,
                warehouse_id: fx.warehouse,
                cell_id: Some(cell),
                quantity: d(5),
                actor_id: fx.actor,
                notes: None,
            })
            .unwrap();
        assert!(fx.service.get_by_cell(cell).unwrap().is_empty());
        assert_eq!(fx.service.get_by_product(product).unwrap().len(), 1);
    }

    #[test]
    fn status_tag_does_not_gate_arithmetic() {
        let fx = setup();
        let product = fx.product();
        let lot = fx.lot(product, None);
        fx.receive(product, Some(lot), 6);

        fx.service
            .set_status(product, fx.warehouse, Some(lot), InventoryStatus::Damaged)
            .unwrap();
        let records = fx.service.get_by_product(product).unwrap();
        assert_eq!(records[0].status(), InventoryStatus::Damaged);

        fx.service.reserve(product, fx.warehouse, d(6), fx.actor).unwrap();
        assert!(matches!(
            fx.service.set_status(product, fx.warehouse, None, InventoryStatus::Expired),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn log_exports_as_json_lines() {
        let fx = setup();
        let product = fx.product();
        fx.receive(product, None, 5);
        fx.service.ship_with_fefo(&fx.fefo(product, 2)).unwrap();

        let entries = fx.service.operations(&LogFilter::product(product)).unwrap();
        let export = export_json_lines(&entries).unwrap();
        let lines: Vec<_> = export.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"RECEIPT\""));
        assert!(lines[1].contains("\"SHIPMENT\""));
    }

    /// Accepts a fixed number of appends, then reports itself unavailable.
    struct ShortLivedLog {
        inner: InMemoryOperationLog,
        appends_left: AtomicUsize,
    }

    impl ShortLivedLog {
        fn accepting(appends: usize) -> Self {
            Self {
                inner: InMemoryOperationLog::new(),
                appends_left: AtomicUsize::new(appends),
            }
        }
    }

    impl OperationLog for ShortLivedLog {
        fn append(&self, entries: Vec<OperationLogEntry>) -> Result<Vec<OperationId>, OperationLogError> {
            self.appends_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| OperationLogError::Unavailable("disk full".to_string()))?;
            self.inner.append(entries)
        }

        fn query(&self, filter: &LogFilter) -> Result<Vec<OperationLogEntry>, OperationLogError> {
            self.inner.query(filter)
        }
    }

    type ShortLivedService = InventoryService<
        Arc<InMemoryLedgerStore>,
        Arc<ShortLivedLog>,
        Arc<InMemoryProductCatalog>,
        Arc<InMemoryBatchRegistry>,
    >;

    fn service_with_log(
        appends: usize,
        config: InventoryConfig,
    ) -> (ShortLivedService, ProductId, WarehouseId, UserId) {
        let products = Arc::new(InMemoryProductCatalog::new());
        let product = ProductId::new();
        products.register(product).unwrap();
        let service = InventoryService::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(ShortLivedLog::accepting(appends)),
            products,
            Arc::new(InMemoryBatchRegistry::new()),
            config,
        );
        (service, product, WarehouseId::new(), UserId::new())
    }

    #[test]
    fn refused_log_append_rolls_back_shipment() {
        let (service, product, warehouse, actor) = service_with_log(1, InventoryConfig::default());
        service
            .receive(&ReceiveStock {
                product_id: product,
                warehouse_id: warehouse,
                lot_id: None,
                cell_id: None,
                quantity: d(10),
                actor_id: actor,
                notes: None,
            })
            .unwrap();

        let err = service
            .ship_with_fefo(&ShipWithFefo {
                product_id: product,
                warehouse_id: warehouse,
                quantity: d(4),
                actor_id: actor,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        assert_eq!(service.stock_level(product, warehouse).unwrap().quantity, d(10));
        let entries = service.operations(&LogFilter::product(product)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, OperationType::Receipt);
    }

    #[test]
    fn refused_log_append_rolls_back_receipt_and_adjustment() {
        let (service, product, warehouse, actor) = service_with_log(0, InventoryConfig::default());
        let receipt = ReceiveStock {
            product_id: product,
            warehouse_id: warehouse,
            lot_id: None,
            cell_id: None,
            quantity: d(10),
            actor_id: actor,
            notes: None,
        };
        assert!(service.receive(&receipt).is_err());
        assert!(service.adjust(&AdjustStock {
            product_id: product,
            warehouse_id: warehouse,
            lot_id: None,
            new_quantity: d(3),
            actor_id: actor,
            notes: None,
        })
        .is_err());

        assert_eq!(service.stock_level(product, warehouse).unwrap().quantity, d(0));
        assert!(service.get_by_product(product).unwrap().is_empty());
    }

    #[test]
    fn refused_log_append_keeps_session_open() {
        let (service, product, warehouse, actor) = service_with_log(1, InventoryConfig::default());
        service
            .receive(&ReceiveStock {
                product_id: product,
                warehouse_id: warehouse,
                lot_id: None,
                cell_id: None,
                quantity: d(10),
                actor_id: actor,
                notes: None,
            })
            .unwrap();

        // Reservations are not logged by default, so they still go through.
        service.reserve(product, warehouse, d(2), actor).unwrap();

        let session_id = service.start_inventory(warehouse, actor, None).unwrap();
        service
            .record_actual_count(session_id, product, None, None, d(7), None)
            .unwrap();
        assert!(service.complete_inventory(session_id, actor).is_err());

        assert_eq!(service.stock_level(product, warehouse).unwrap().quantity, d(10));
        let session = service.get_session(session_id).unwrap();
        assert_eq!(session.status(), SessionStatus::InProgress);
        assert_eq!(session.completed_by(), None);
    }

    #[test]
    fn refused_log_append_rolls_back_logged_reservation() {
        let config = InventoryConfig {
            log_reservations: true,
            ..InventoryConfig::default()
        };
        let (service, product, warehouse, actor) = service_with_log(1, config);
        service
            .receive(&ReceiveStock {
                product_id: product,
                warehouse_id: warehouse,
                lot_id: None,
                cell_id: None,
                quantity: d(10),
                actor_id: actor,
                notes: None,
            })
            .unwrap();

        assert!(service.reserve(product, warehouse, d(4), actor).is_err());
        let level = service.stock_level(product, warehouse).unwrap();
        assert_eq!(level.reserved_quantity, d(0));
        assert_eq!(level.available, d(10));
    }

    #[test]
    fn concurrent_fefo_shipments_never_exceed_stock() {
        let fx = Arc::new(setup());
        let product = fx.product();
        let lot = fx.lot(product, Some(today() + Duration::days(30)));
        fx.receive(product, Some(lot), 10);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let fx = fx.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    fx.service.ship_with_fefo(&fx.fefo(product, 6))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(DomainError::InsufficientStock { .. }))));
        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(4));
        let shipments = fx
            .service
            .operations(&LogFilter::product(product).of_type(OperationType::Shipment))
            .unwrap();
        assert_eq!(shipments.len(), 1);
        assert_eq!(shipments[0].quantity, d(-6));
    }

    #[test]
    fn concurrent_completions_apply_counts_once() {
        let fx = Arc::new(setup());
        let product = fx.product();
        fx.receive(product, None, 50);
        let session_id = fx.service.start_inventory(fx.warehouse, fx.actor, None).unwrap();
        fx.service
            .record_actual_count(session_id, product, None, None, d(47), None)
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let fx = fx.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    fx.service.complete_inventory(session_id, fx.actor)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(fx.service.stock_level(product, fx.warehouse).unwrap().quantity, d(47));
        let adjustments = fx
            .service
            .operations(&LogFilter::product(product).of_type(OperationType::Adjustment))
            .unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(
            fx.service.get_session(session_id).unwrap().status(),
            SessionStatus::Completed
        );
    }
}
