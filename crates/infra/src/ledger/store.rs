use thiserror::Error;

use stockcore_core::{CellId, DomainError, DomainResult, ExpectedVersion, ProductId, WarehouseId};
use stockcore_inventory::{InventoryRecord, StockKey, StockPartition};
use std::sync::Arc;

/// A partition as read from storage, with the version it was read at.
///
/// Absent partitions load as empty with version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSnapshot {
    pub version: u64,
    pub partition: StockPartition,
}

/// Replacement record set for one partition, conditional on its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionWrite {
    pub key: StockKey,
    pub expected_version: ExpectedVersion,
    pub records: Vec<InventoryRecord>,
}

/// Which records a scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    Warehouse(WarehouseId),
    Product(ProductId),
    Cell(CellId),
}

impl RecordFilter {
    pub fn matches(&self, record: &InventoryRecord) -> bool {
        match self {
            RecordFilter::Warehouse(id) => record.warehouse_id() == *id,
            RecordFilter::Product(id) => record.product_id() == *id,
            RecordFilter::Cell(id) => record.cell_id() == Some(*id),
        }
    }
}

/// Ledger storage operation error.
///
/// These are infrastructure errors; business rule failures never reach the
/// store because they are decided before a write is attempted.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("optimistic concurrency check failed for {key}: expected {expected:?}, found {actual}")]
    Concurrency {
        key: StockKey,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),

    /// The commit hook rejected the batch; nothing was written.
    #[error("commit aborted: {0}")]
    Aborted(DomainError),
}

impl LedgerStoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, LedgerStoreError::Concurrency { .. })
    }
}

impl From<LedgerStoreError> for DomainError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::Concurrency { .. } => DomainError::contention(value.to_string()),
            LedgerStoreError::Aborted(inner) => inner,
            other => DomainError::invalid_state(other.to_string()),
        }
    }
}

/// Versioned storage of stock partitions.
///
/// ## Commit semantics
///
/// `commit()`:
/// - checks every write's `expected_version` against the stored version
/// - applies all writes or none (a single stale partition rejects the batch)
/// - bumps each written partition's version by one
///
/// `commit_with()` additionally runs `before_write` once every version check
/// has passed, while the written partitions are still locked and before any
/// record changes. An `Err` from the hook aborts the batch with
/// [`LedgerStoreError::Aborted`]. The hook runs even for an empty batch.
///
/// Writers must never hold a partition across calls; the read-decide-commit
/// cycle plus retry lives in [`crate::ledger::Ledger`].
pub trait LedgerStore: Send + Sync {
    fn load(&self, key: StockKey) -> Result<PartitionSnapshot, LedgerStoreError>;

    fn commit(&self, writes: Vec<PartitionWrite>) -> Result<(), LedgerStoreError> {
        self.commit_with(writes, &mut || Ok(()))
    }

    fn commit_with(
        &self,
        writes: Vec<PartitionWrite>,
        before_write: &mut dyn FnMut() -> DomainResult<()>,
    ) -> Result<(), LedgerStoreError>;

    /// All records matching `filter`, grouped by partition in key order.
    fn scan(&self, filter: RecordFilter) -> Result<Vec<InventoryRecord>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load(&self, key: StockKey) -> Result<PartitionSnapshot, LedgerStoreError> {
        (**self).load(key)
    }

    fn commit_with(
        &self,
        writes: Vec<PartitionWrite>,
        before_write: &mut dyn FnMut() -> DomainResult<()>,
    ) -> Result<(), LedgerStoreError> {
        (**self).commit_with(writes, before_write)
    }

    fn scan(&self, filter: RecordFilter) -> Result<Vec<InventoryRecord>, LedgerStoreError> {
        (**self).scan(filter)
    }
}
