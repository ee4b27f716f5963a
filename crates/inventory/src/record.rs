//! Inventory records and the per-key stock partition.
//!
//! An `InventoryRecord` holds one lot slot's on-hand and reserved quantity;
//! every mutator keeps `0 <= reserved <= quantity` and fails before changing
//! anything. A `StockPartition` is every record under one `(product,
//! warehouse)` key and is the unit the ledger serializes writes on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{
    CellId, DomainError, DomainResult, InventoryRecordId, LotId, ProductId, WarehouseId,
};

/// Informational tag on an inventory record. Does not gate arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryStatus {
    Available,
    Reserved,
    Damaged,
    Expired,
    InTransit,
}

/// Coarse stock key. All mutations against one key are serialized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.warehouse_id)
    }
}

/// On-hand and promised quantity for one (product, warehouse, lot, cell) slot.
///
/// Invariant: `0 <= reserved_quantity <= quantity`. Every mutator checks the
/// invariant before touching state, so a failed call leaves the record as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    id: InventoryRecordId,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    lot_id: Option<LotId>,
    cell_id: Option<CellId>,
    quantity: Decimal,
    reserved_quantity: Decimal,
    status: InventoryStatus,
    last_updated: DateTime<Utc>,
}

impl InventoryRecord {
    /// Create an empty record (quantity and reservation both zero).
    pub fn empty(
        key: StockKey,
        lot_id: Option<LotId>,
        cell_id: Option<CellId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InventoryRecordId::new(),
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            lot_id,
            cell_id,
            quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            status: InventoryStatus::Available,
            last_updated: at,
        }
    }

    pub fn id(&self) -> InventoryRecordId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn lot_id(&self) -> Option<LotId> {
        self.lot_id
    }

    pub fn cell_id(&self) -> Option<CellId> {
        self.cell_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> Decimal {
        self.reserved_quantity
    }

    /// `quantity - reserved_quantity`.
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }

    pub fn status(&self) -> InventoryStatus {
        self.status
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Apply a signed quantity delta.
    pub fn apply_quantity_delta(&mut self, delta: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        let new_quantity = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_state("quantity overflow"))?;
        if new_quantity < Decimal::ZERO {
            return Err(DomainError::invalid_state(format!(
                "quantity would go negative ({} + {delta})",
                self.quantity
            )));
        }
        if new_quantity < self.reserved_quantity {
            return Err(DomainError::invalid_state(format!(
                "quantity {new_quantity} would drop below reserved {}",
                self.reserved_quantity
            )));
        }
        self.quantity = new_quantity;
        self.last_updated = at;
        Ok(())
    }

    /// Apply a signed reservation delta.
    pub fn apply_reserved_delta(&mut self, delta: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        let new_reserved = self
            .reserved_quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_state("reserved quantity overflow"))?;
        if new_reserved < Decimal::ZERO || new_reserved > self.quantity {
            return Err(DomainError::invalid_state(format!(
                "reserved quantity {new_reserved} outside [0, {}]",
                self.quantity
            )));
        }
        self.reserved_quantity = new_reserved;
        self.last_updated = at;
        Ok(())
    }

    /// Remove `qty` from unreserved stock.
    pub fn withdraw(&mut self, qty: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        let available = self.available();
        if qty > available {
            return Err(DomainError::insufficient(qty, available));
        }
        self.apply_quantity_delta(-qty, at)
    }

    /// Overwrite the on-hand quantity (physical count is authoritative).
    pub fn set_quantity(&mut self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<Decimal> {
        if quantity < Decimal::ZERO {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if quantity < self.reserved_quantity {
            return Err(DomainError::invalid_state(format!(
                "cannot set quantity to {quantity}: {} is reserved",
                self.reserved_quantity
            )));
        }
        let previous = self.quantity;
        self.quantity = quantity;
        self.last_updated = at;
        Ok(previous)
    }

    pub fn set_status(&mut self, status: InventoryStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_updated = at;
    }

    fn move_to_cell(&mut self, cell_id: Option<CellId>) {
        if cell_id.is_some() {
            self.cell_id = cell_id;
        }
    }
}

/// What a single ledger mutation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Signed delta on on-hand quantity.
    Quantity(Decimal),
    /// Signed delta on reserved quantity.
    Reserved(Decimal),
}

/// The ledger's single write primitive, addressed to one lot slot of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMutation {
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub change: StockChange,
}

/// Aggregated view over every record of one stock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub key: StockKey,
    pub quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub available: Decimal,
    pub last_updated: Option<DateTime<Utc>>,
    pub records: Vec<InventoryRecord>,
}

/// All records stored under one stock key, in receipt order.
///
/// This is the unit the ledger loads, mutates and commits atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPartition {
    key: StockKey,
    records: Vec<InventoryRecord>,
}

impl StockPartition {
    pub fn new(key: StockKey) -> Self {
        Self {
            key,
            records: Vec::new(),
        }
    }

    pub fn from_records(key: StockKey, records: Vec<InventoryRecord>) -> Self {
        Self { key, records }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn records(&self) -> &[InventoryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<InventoryRecord> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total on-hand across all records. Fails if the sum is not representable.
    pub fn quantity(&self) -> DomainResult<Decimal> {
        checked_total(self.records.iter().map(InventoryRecord::quantity), "quantity")
    }

    pub fn reserved_quantity(&self) -> DomainResult<Decimal> {
        checked_total(
            self.records.iter().map(InventoryRecord::reserved_quantity),
            "reserved quantity",
        )
    }

    pub fn available(&self) -> DomainResult<Decimal> {
        checked_total(self.records.iter().map(InventoryRecord::available), "available quantity")
    }

    pub fn level(&self) -> DomainResult<StockLevel> {
        Ok(StockLevel {
            key: self.key,
            quantity: self.quantity()?,
            reserved_quantity: self.reserved_quantity()?,
            available: self.available()?,
            last_updated: self.records.iter().map(InventoryRecord::last_updated).max(),
            records: self.records.clone(),
        })
    }

    pub fn record(&self, id: InventoryRecordId) -> Option<&InventoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn record_mut(&mut self, id: InventoryRecordId) -> DomainResult<&mut InventoryRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DomainError::not_found("inventory record", id))
    }

    /// The record holding `lot_id` (lot-less stock lives in the `None` slot).
    pub fn lot_slot_mut(&mut self, lot_id: Option<LotId>) -> Option<&mut InventoryRecord> {
        self.records.iter_mut().find(|r| r.lot_id == lot_id)
    }

    fn ensure_lot_slot(
        &mut self,
        lot_id: Option<LotId>,
        cell_id: Option<CellId>,
        at: DateTime<Utc>,
    ) -> &mut InventoryRecord {
        let idx = match self.records.iter().position(|r| r.lot_id == lot_id) {
            Some(idx) => idx,
            None => {
                self.records
                    .push(InventoryRecord::empty(self.key, lot_id, cell_id, at));
                self.records.len() - 1
            }
        };
        &mut self.records[idx]
    }

    /// Apply the write primitive.
    ///
    /// A positive quantity delta on an unknown slot creates it; any other change
    /// on an unknown slot fails with `NotFound`.
    pub fn apply(&mut self, mutation: StockMutation, at: DateTime<Utc>) -> DomainResult<InventoryRecordId> {
        let creates = matches!(mutation.change, StockChange::Quantity(d) if d > Decimal::ZERO);
        let key = self.key;
        let record = if creates {
            self.ensure_lot_slot(mutation.lot_id, mutation.cell_id, at)
        } else {
            self.lot_slot_mut(mutation.lot_id)
                .ok_or_else(|| DomainError::not_found("inventory record", key))?
        };

        match mutation.change {
            StockChange::Quantity(delta) => record.apply_quantity_delta(delta, at)?,
            StockChange::Reserved(delta) => record.apply_reserved_delta(delta, at)?,
        }
        if creates {
            record.move_to_cell(mutation.cell_id);
        }
        Ok(record.id)
    }

    /// Add received stock to the lot's slot, creating it on first receipt.
    pub fn receive(
        &mut self,
        lot_id: Option<LotId>,
        cell_id: Option<CellId>,
        qty: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryRecordId> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        checked_total([self.quantity()?, qty], "quantity")?;
        self.apply(
            StockMutation {
                lot_id,
                cell_id,
                change: StockChange::Quantity(qty),
            },
            at,
        )
    }

    /// Reserve `qty` across records in receipt order.
    ///
    /// Fails with `InsufficientStock` when the key's total available is short;
    /// nothing is changed in that case.
    pub fn reserve(&mut self, qty: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::validation("reserved quantity must be positive"));
        }
        if self.records.is_empty() {
            return Err(DomainError::not_found("inventory record", self.key));
        }
        let available = self.available()?;
        if qty > available {
            return Err(DomainError::insufficient(qty, available));
        }

        let mut remaining = qty;
        for record in self.records.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let take = remaining.min(record.available());
            if take > Decimal::ZERO {
                record.apply_reserved_delta(take, at)?;
                remaining -= take;
            }
        }
        Ok(())
    }

    /// Release `qty` of reservations, newest records first.
    pub fn release(&mut self, qty: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::validation("released quantity must be positive"));
        }
        if self.records.is_empty() {
            return Err(DomainError::not_found("inventory record", self.key));
        }
        let reserved = self.reserved_quantity()?;
        if qty > reserved {
            return Err(DomainError::invalid_state(format!(
                "cannot release {qty}: only {reserved} is reserved"
            )));
        }

        let mut remaining = qty;
        for record in self.records.iter_mut().rev() {
            if remaining.is_zero() {
                break;
            }
            let take = remaining.min(record.reserved_quantity());
            if take > Decimal::ZERO {
                record.apply_reserved_delta(-take, at)?;
                remaining -= take;
            }
        }
        Ok(())
    }

    /// Overwrite a record's quantity, recreating the lot slot if it is gone.
    ///
    /// Returns `(record id, previous quantity)`.
    pub fn set_quantity(
        &mut self,
        record_id: Option<InventoryRecordId>,
        lot_id: Option<LotId>,
        cell_id: Option<CellId>,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<(InventoryRecordId, Decimal)> {
        let total = self.quantity()?;
        let by_id = record_id.and_then(|id| self.records.iter().position(|r| r.id == id));
        let record = match by_id {
            Some(idx) => &mut self.records[idx],
            None => self.ensure_lot_slot(lot_id, cell_id, at),
        };
        checked_total([total - record.quantity, quantity], "quantity")?;
        let previous = record.set_quantity(quantity, at)?;
        Ok((record.id, previous))
    }
}

fn checked_total(values: impl IntoIterator<Item = Decimal>, what: &str) -> DomainResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| DomainError::invalid_state(format!("{what} overflow")))
}
