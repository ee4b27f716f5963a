//! Infrastructure layer: ledger storage, operation log, external
//! collaborators, configuration and the service entry points.

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod operation_log;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use catalog::{InMemoryBatchRegistry, InMemoryProductCatalog, ProductCatalog};
pub use config::InventoryConfig;
pub use ledger::{InMemoryLedgerStore, Ledger, LedgerStore, LedgerStoreError, RecordFilter};
pub use operation_log::{
    InMemoryOperationLog, LogFilter, OperationLog, OperationLogError, export_json_lines,
};
pub use service::{
    ExpiringStock, InMemoryInventoryService, InventoryService, SessionRegistry, ShipmentReceipt,
};
