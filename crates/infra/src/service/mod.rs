//! Operation entry points of the inventory core.
//!
//! `InventoryService` composes the ledger, the operation log and the two
//! external collaborators (product catalog, batch registry):
//!
//! ```text
//! request
//!   ↓ validate (quantity, product existence, lot ownership)
//! Ledger::update_with (per-key atomic read-decide-commit)
//!   ↓ decide: new partition state + one log entry per touched record
//!   ↓ publish: OperationLog::append, slot locks still held
//! records written
//! ```
//!
//! A failed append aborts the commit, so the ledger never moves without its
//! log entries.

pub mod reconciliation;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{
    CellId, DomainError, DomainResult, InventoryRecordId, LotId, OperationGroupId, OperationId,
    ProductId, UserId, WarehouseId,
};
use stockcore_inventory::{
    AdjustStock, Allocation, AllocationPolicy, BatchRegistry, InventoryRecord, InventoryStatus,
    Lot, OperationLogEntry, OperationType, ReceiveStock, ShipStock, ShipWithFefo, StockKey,
    StockLevel, StockPartition, allocate,
};

use crate::catalog::{InMemoryBatchRegistry, InMemoryProductCatalog, ProductCatalog};
use crate::config::InventoryConfig;
use crate::ledger::{InMemoryLedgerStore, Ledger, LedgerStore, RecordFilter};
use crate::operation_log::{InMemoryOperationLog, LogFilter, OperationLog};

pub use reconciliation::SessionRegistry;

/// Outcome of a shipment: one log entry per drawn record, sharing `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentReceipt {
    pub group_id: OperationGroupId,
    pub operation_ids: Vec<OperationId>,
    pub allocations: Vec<Allocation>,
}

/// Stock whose lot expires within the configured horizon (or already has).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringStock {
    pub record: InventoryRecord,
    pub lot: Lot,
    /// Negative once expired.
    pub days_until_expiry: i64,
}

/// One "set quantity" correction on the shared adjustment path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdjustmentLine {
    pub key: StockKey,
    pub record_id: Option<InventoryRecordId>,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub new_quantity: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AppliedAdjustment {
    pub record_id: InventoryRecordId,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub operation_id: OperationId,
}

/// Decided-but-uncommitted adjustments: `(record, quantity before)` per line
/// plus the entries to log with them.
#[derive(Debug, Clone)]
pub(crate) struct AdjustmentBatch {
    touched: Vec<(InventoryRecordId, Decimal)>,
    pub entries: Vec<OperationLogEntry>,
}

impl AdjustmentBatch {
    pub fn into_applied(self, lines: &[AdjustmentLine]) -> Vec<AppliedAdjustment> {
        lines
            .iter()
            .zip(self.touched)
            .zip(self.entries)
            .map(|((line, (record_id, before)), entry)| {
                tracing::info!(
                    operation_id = %entry.operation_id,
                    key = %line.key,
                    before = %before,
                    after = %line.new_quantity,
                    "stock adjusted"
                );
                AppliedAdjustment {
                    record_id,
                    quantity_before: before,
                    quantity_after: line.new_quantity,
                    operation_id: entry.operation_id,
                }
            })
            .collect()
    }
}

/// Distinct keys touched by `lines`, in lock order.
pub(crate) fn adjustment_keys(lines: &[AdjustmentLine]) -> Vec<StockKey> {
    lines
        .iter()
        .map(|l| l.key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct InventoryService<S, L, C, B> {
    ledger: Ledger<S>,
    log: L,
    products: C,
    lots: B,
    config: InventoryConfig,
    sessions: SessionRegistry,
}

/// Fully in-memory wiring (tests/dev).
pub type InMemoryInventoryService = InventoryService<
    Arc<InMemoryLedgerStore>,
    Arc<InMemoryOperationLog>,
    Arc<InMemoryProductCatalog>,
    Arc<InMemoryBatchRegistry>,
>;

impl InMemoryInventoryService {
    pub fn in_memory(
        products: Arc<InMemoryProductCatalog>,
        lots: Arc<InMemoryBatchRegistry>,
        config: InventoryConfig,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryOperationLog::new()),
            products,
            lots,
            config,
        )
    }
}

impl<S, L, C, B> InventoryService<S, L, C, B> {
    pub fn new(store: S, log: L, products: C, lots: B, config: InventoryConfig) -> Self {
        Self {
            ledger: Ledger::new(store, config.max_commit_retries),
            log,
            products,
            lots,
            config,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}

impl<S, L, C, B> InventoryService<S, L, C, B>
where
    S: LedgerStore,
    L: OperationLog,
    C: ProductCatalog,
    B: BatchRegistry,
{
    fn ensure_product(&self, product_id: ProductId) -> DomainResult<()> {
        if self.products.product_exists(&product_id) {
            Ok(())
        } else {
            Err(DomainError::not_found("product", product_id))
        }
    }

    fn ensure_lot(&self, lot_id: LotId, product_id: ProductId) -> DomainResult<Lot> {
        let lot = self
            .lots
            .get_lot(&lot_id)
            .ok_or_else(|| DomainError::not_found("lot", lot_id))?;
        if lot.product_id != product_id {
            return Err(DomainError::validation(format!(
                "lot {lot_id} belongs to product {}, not {product_id}",
                lot.product_id
            )));
        }
        Ok(lot)
    }

    fn expiry_of(&self, lot_id: Option<LotId>) -> Option<NaiveDate> {
        lot_id
            .and_then(|id| self.lots.get_lot(&id))
            .and_then(|lot| lot.expiry_date)
    }

    /// Append step run inside a ledger commit.
    fn publish(&self, entries: &[OperationLogEntry]) -> DomainResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.log.append(entries.to_vec())?;
        Ok(())
    }

    fn positive(quantity: Decimal, what: &str) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!("{what} quantity must be positive")));
        }
        Ok(())
    }

    /// Receive stock into the lot's record, creating it on first receipt.
    pub fn receive(&self, cmd: &ReceiveStock) -> DomainResult<OperationId> {
        Self::positive(cmd.quantity, "received")?;
        self.ensure_product(cmd.product_id)?;
        let expiry = match cmd.lot_id {
            Some(lot_id) => self.ensure_lot(lot_id, cmd.product_id)?.expiry_date,
            None => None,
        };

        let key = StockKey::new(cmd.product_id, cmd.warehouse_id);
        let now = Utc::now();
        let (record_id, entry) = self.ledger.update_with(
            key,
            |partition| {
                let record_id = partition.receive(cmd.lot_id, cmd.cell_id, cmd.quantity, now)?;
                let entry = OperationLogEntry::new(
                    OperationType::Receipt,
                    cmd.product_id,
                    cmd.warehouse_id,
                    cmd.quantity,
                    cmd.actor_id,
                    now,
                )
                .with_lot(cmd.lot_id, expiry)
                .with_cells(None, cmd.cell_id)
                .with_notes(cmd.notes.clone());
                Ok((record_id, entry))
            },
            |(_, entry)| self.publish(std::slice::from_ref(entry)),
        )?;
        let operation_id = entry.operation_id;

        tracing::info!(
            %operation_id,
            %record_id,
            product_id = %cmd.product_id,
            warehouse_id = %cmd.warehouse_id,
            quantity = %cmd.quantity,
            "stock received"
        );
        Ok(operation_id)
    }

    /// Ship without expiry preference, drawing records in receipt order
    /// (restricted to `cell_id` when given).
    pub fn ship(&self, cmd: &ShipStock) -> DomainResult<ShipmentReceipt> {
        self.ship_with_policy(
            cmd.product_id,
            cmd.warehouse_id,
            cmd.quantity,
            AllocationPolicy::ReceiptOrder {
                cell_id: cmd.cell_id,
            },
            cmd.actor_id,
            cmd.notes.clone(),
        )
    }

    /// Ship drawing from the soonest-expiring lots first.
    pub fn ship_with_fefo(&self, cmd: &ShipWithFefo) -> DomainResult<ShipmentReceipt> {
        self.ship_with_policy(
            cmd.product_id,
            cmd.warehouse_id,
            cmd.quantity,
            AllocationPolicy::Fefo,
            cmd.actor_id,
            cmd.notes.clone(),
        )
    }

    fn ship_with_policy(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
        policy: AllocationPolicy,
        actor_id: UserId,
        notes: Option<String>,
    ) -> DomainResult<ShipmentReceipt> {
        Self::positive(quantity, "shipped")?;
        self.ensure_product(product_id)?;

        let key = StockKey::new(product_id, warehouse_id);
        let now = Utc::now();
        let today = now.date_naive();
        let group_id = OperationGroupId::new();

        // Selection, draw-down and the log entries all come from the same
        // read; a concurrent writer on this key forces a fresh selection.
        let (plan, entries) = self.ledger.update_with(
            key,
            |partition| {
                let plan = allocate(partition, &self.lots, quantity, policy, today)?;
                plan.apply(partition, now)?;
                let entries: Vec<OperationLogEntry> = plan
                    .allocations
                    .iter()
                    .map(|a| {
                        OperationLogEntry::new(
                            OperationType::Shipment,
                            product_id,
                            warehouse_id,
                            -a.quantity,
                            actor_id,
                            now,
                        )
                        .in_group(group_id)
                        .with_lot(a.lot_id, a.expiry_date)
                        .with_cells(a.cell_id, None)
                        .with_notes(notes.clone())
                    })
                    .collect();
                Ok((plan, entries))
            },
            |(_, entries)| self.publish(entries),
        )?;

        for a in plan.allocations.iter().filter(|a| a.expired) {
            tracing::warn!(
                product_id = %product_id,
                warehouse_id = %warehouse_id,
                lot_id = ?a.lot_id,
                expiry_date = ?a.expiry_date,
                quantity = %a.quantity,
                "allocated stock from an expired lot"
            );
        }
        tracing::debug!(?policy, allocations = plan.allocations.len(), "shipment allocated");

        let operation_ids = entries.iter().map(|e| e.operation_id).collect();
        tracing::info!(
            %group_id,
            product_id = %product_id,
            warehouse_id = %warehouse_id,
            quantity = %quantity,
            lots = plan.allocations.len(),
            "stock shipped"
        );
        Ok(ShipmentReceipt {
            group_id,
            operation_ids,
            allocations: plan.allocations,
        })
    }

    /// Promise `quantity` of available stock to a pending shipment.
    pub fn reserve(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
        actor_id: UserId,
    ) -> DomainResult<()> {
        Self::positive(quantity, "reserved")?;
        let key = StockKey::new(product_id, warehouse_id);
        let now = Utc::now();
        self.ledger.update_with(
            key,
            |partition| {
                partition.reserve(quantity, now)?;
                Ok(self.reservation_entries(key, quantity, actor_id, now))
            },
            |entries| self.publish(entries),
        )?;
        tracing::info!(%key, quantity = %quantity, "stock reserved");
        Ok(())
    }

    /// Give back `quantity` of previously reserved stock.
    pub fn release(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
        actor_id: UserId,
    ) -> DomainResult<()> {
        Self::positive(quantity, "released")?;
        let key = StockKey::new(product_id, warehouse_id);
        let now = Utc::now();
        self.ledger.update_with(
            key,
            |partition| {
                partition.release(quantity, now)?;
                Ok(self.reservation_entries(key, -quantity, actor_id, now))
            },
            |entries| self.publish(entries),
        )?;
        tracing::info!(%key, quantity = %quantity, "reservation released");
        Ok(())
    }

    fn reservation_entries(
        &self,
        key: StockKey,
        signed_quantity: Decimal,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> Vec<OperationLogEntry> {
        if !self.config.log_reservations {
            return vec![];
        }
        vec![OperationLogEntry::new(
            OperationType::Reservation,
            key.product_id,
            key.warehouse_id,
            signed_quantity,
            actor_id,
            at,
        )]
    }

    /// Manually set a lot slot's on-hand quantity (e.g. damage write-off).
    pub fn adjust(&self, cmd: &AdjustStock) -> DomainResult<OperationId> {
        self.ensure_product(cmd.product_id)?;
        if let Some(lot_id) = cmd.lot_id {
            self.ensure_lot(lot_id, cmd.product_id)?;
        }
        let line = AdjustmentLine {
            key: StockKey::new(cmd.product_id, cmd.warehouse_id),
            record_id: None,
            lot_id: cmd.lot_id,
            cell_id: None,
            new_quantity: cmd.new_quantity,
            notes: cmd.notes.clone(),
        };
        let applied = self.write_adjustments(&[line], cmd.actor_id)?;
        applied
            .first()
            .map(|a| a.operation_id)
            .ok_or_else(|| DomainError::invalid_state("adjustment produced no log entry"))
    }

    /// The shared "physical quantity is authoritative" write path.
    ///
    /// All lines commit atomically across their keys together with one
    /// `ADJUSTMENT` entry per line noting the old and new quantity.
    fn write_adjustments(
        &self,
        lines: &[AdjustmentLine],
        actor_id: UserId,
    ) -> DomainResult<Vec<AppliedAdjustment>> {
        let now = Utc::now();
        let batch = self.ledger.update_many_with(
            &adjustment_keys(lines),
            |partitions| self.decide_adjustments(partitions, lines, actor_id, None, now),
            |batch| self.publish(&batch.entries),
        )?;
        Ok(batch.into_applied(lines))
    }

    /// Apply every line to `partitions` and build the matching log entries.
    pub(crate) fn decide_adjustments(
        &self,
        partitions: &mut BTreeMap<StockKey, StockPartition>,
        lines: &[AdjustmentLine],
        actor_id: UserId,
        group_id: Option<OperationGroupId>,
        now: DateTime<Utc>,
    ) -> DomainResult<AdjustmentBatch> {
        let mut touched = Vec::with_capacity(lines.len());
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            let partition = partitions
                .get_mut(&line.key)
                .ok_or_else(|| DomainError::not_found("stock partition", line.key))?;
            let (record_id, before) = partition.set_quantity(
                line.record_id,
                line.lot_id,
                line.cell_id,
                line.new_quantity,
                now,
            )?;
            let note = match &line.notes {
                Some(extra) => format!("{before} -> {}: {extra}", line.new_quantity),
                None => format!("{before} -> {}", line.new_quantity),
            };
            let entry = OperationLogEntry::new(
                OperationType::Adjustment,
                line.key.product_id,
                line.key.warehouse_id,
                line.new_quantity - before,
                actor_id,
                now,
            )
            .with_lot(line.lot_id, self.expiry_of(line.lot_id))
            .with_cells(None, line.cell_id)
            .with_notes(Some(note));
            entries.push(match group_id {
                Some(g) => entry.in_group(g),
                None => entry,
            });
            touched.push((record_id, before));
        }
        Ok(AdjustmentBatch { touched, entries })
    }

    /// Tag a lot slot (damaged, expired, in transit, ...). Arithmetic is unaffected.
    pub fn set_status(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        lot_id: Option<LotId>,
        status: InventoryStatus,
    ) -> DomainResult<()> {
        let key = StockKey::new(product_id, warehouse_id);
        let now = Utc::now();
        self.ledger.update(key, |partition| {
            let record = partition
                .lot_slot_mut(lot_id)
                .ok_or_else(|| DomainError::not_found("inventory record", key))?;
            record.set_status(status, now);
            Ok(())
        })
    }

    /// Aggregated quantities for one product at one warehouse.
    pub fn stock_level(&self, product_id: ProductId, warehouse_id: WarehouseId) -> DomainResult<StockLevel> {
        self.ledger.get(StockKey::new(product_id, warehouse_id))
    }

    fn in_stock(&self, filter: RecordFilter) -> DomainResult<Vec<InventoryRecord>> {
        let mut records = self.ledger.records(filter)?;
        records.retain(|r| r.quantity() > Decimal::ZERO);
        Ok(records)
    }

    pub fn get_by_warehouse(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<InventoryRecord>> {
        self.in_stock(RecordFilter::Warehouse(warehouse_id))
    }

    pub fn get_by_product(&self, product_id: ProductId) -> DomainResult<Vec<InventoryRecord>> {
        self.in_stock(RecordFilter::Product(product_id))
    }

    pub fn get_by_cell(&self, cell_id: CellId) -> DomainResult<Vec<InventoryRecord>> {
        self.in_stock(RecordFilter::Cell(cell_id))
    }

    /// Available stock at `warehouse_id` expiring within the configured horizon,
    /// soonest first. Already-expired stock is included.
    pub fn expiring_stock(&self, warehouse_id: WarehouseId, today: NaiveDate) -> DomainResult<Vec<ExpiringStock>> {
        let horizon = today + Duration::days(self.config.expiry_warning_days);
        let mut out: Vec<ExpiringStock> = self
            .ledger
            .records(RecordFilter::Warehouse(warehouse_id))?
            .into_iter()
            .filter(|r| r.available() > Decimal::ZERO)
            .filter_map(|record| {
                let lot = self.lots.get_lot(&record.lot_id()?)?;
                let expiry = lot.expiry_date?;
                (expiry <= horizon).then(|| ExpiringStock {
                    days_until_expiry: (expiry - today).num_days(),
                    record,
                    lot,
                })
            })
            .collect();
        out.sort_by_key(|e| e.days_until_expiry);
        Ok(out)
    }

    pub fn operations(&self, filter: &LogFilter) -> DomainResult<Vec<OperationLogEntry>> {
        Ok(self.log.query(filter)?)
    }
}
