//! Operation log entries: the durable, append-only audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{CellId, LotId, OperationGroupId, OperationId, ProductId, UserId, WarehouseId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Receipt,
    Shipment,
    Reservation,
    Adjustment,
}

impl OperationType {
    /// Stable name used in exports (e.g. "inventory.shipment").
    pub fn event_type(self) -> &'static str {
        match self {
            OperationType::Receipt => "inventory.receipt",
            OperationType::Shipment => "inventory.shipment",
            OperationType::Reservation => "inventory.reservation",
            OperationType::Adjustment => "inventory.adjustment",
        }
    }
}

/// One quantity-changing event. Immutable once appended.
///
/// `quantity` is signed: receipts are positive, shipments negative,
/// reservations positive on reserve and negative on release, adjustments carry
/// `new - old`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub operation_id: OperationId,
    /// Shared by all entries produced by one request (e.g. a multi-lot shipment).
    pub group_id: Option<OperationGroupId>,
    pub operation_type: OperationType,
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub warehouse_id: WarehouseId,
    pub from_cell: Option<CellId>,
    pub to_cell: Option<CellId>,
    pub quantity: Decimal,
    /// Lot expiry at the time of the operation (shipment traceability).
    pub expiry_date: Option<NaiveDate>,
    pub actor_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

impl OperationLogEntry {
    pub fn new(
        operation_type: OperationType,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
        actor_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_id: OperationId::new(),
            group_id: None,
            operation_type,
            product_id,
            lot_id: None,
            warehouse_id,
            from_cell: None,
            to_cell: None,
            quantity,
            expiry_date: None,
            actor_id,
            timestamp,
            notes: None,
        }
    }

    pub fn in_group(mut self, group_id: OperationGroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_lot(mut self, lot_id: Option<LotId>, expiry_date: Option<NaiveDate>) -> Self {
        self.lot_id = lot_id;
        self.expiry_date = expiry_date;
        self
    }

    pub fn with_cells(mut self, from_cell: Option<CellId>, to_cell: Option<CellId>) -> Self {
        self.from_cell = from_cell;
        self.to_cell = to_cell;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}
