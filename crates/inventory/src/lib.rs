//! Inventory domain module.
//!
//! This crate contains the business rules of the stock core, implemented purely
//! as deterministic domain logic (no IO, no locking, no storage): per-record
//! quantity arithmetic, lot expiry ranking, shipment allocation, the operation
//! log entry model and the reconciliation session state machine.

pub mod allocation;
pub mod command;
pub mod lot;
pub mod operation;
pub mod reconciliation;
pub mod record;

pub use allocation::{Allocation, AllocationPlan, AllocationPolicy, allocate};
pub use command::{AdjustStock, ReceiveStock, ShipStock, ShipWithFefo};
pub use lot::{BatchRegistry, ExpiryRank, Lot};
pub use operation::{OperationLogEntry, OperationType};
pub use reconciliation::{
    CompletionPlan, CountAdjustment, CountRecord, CountTarget, Discrepancy,
    ReconciliationSession, ReconciliationSummary, SessionStatus,
};
pub use record::{
    InventoryRecord, InventoryStatus, StockChange, StockKey, StockLevel, StockMutation,
    StockPartition,
};
