use thiserror::Error;

use stockcore_core::{DomainError, OperationGroupId, OperationId, ProductId, WarehouseId};
use stockcore_inventory::{OperationLogEntry, OperationType};
use std::sync::Arc;

/// Operation log error.
#[derive(Debug, Error)]
pub enum OperationLogError {
    #[error("duplicate operation id: {0}")]
    DuplicateOperation(OperationId),

    #[error("operation log unavailable: {0}")]
    Unavailable(String),

    #[error("failed to serialize operation: {0}")]
    Serialize(String),
}

impl From<OperationLogError> for DomainError {
    fn from(value: OperationLogError) -> Self {
        match value {
            OperationLogError::DuplicateOperation(id) => {
                DomainError::conflict(format!("operation {id} already logged"))
            }
            other => DomainError::invalid_state(other.to_string()),
        }
    }
}

/// Conjunctive filter over log entries; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub group_id: Option<OperationGroupId>,
    pub operation_type: Option<OperationType>,
}

impl LogFilter {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn warehouse(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id: Some(warehouse_id),
            ..Self::default()
        }
    }

    pub fn group(group_id: OperationGroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn matches(&self, entry: &OperationLogEntry) -> bool {
        self.product_id.is_none_or(|p| entry.product_id == p)
            && self.warehouse_id.is_none_or(|w| entry.warehouse_id == w)
            && self.group_id.is_none_or(|g| entry.group_id == Some(g))
            && self.operation_type.is_none_or(|t| entry.operation_type == t)
    }
}

/// Append-only operation log.
///
/// `append()` persists a batch atomically (all entries or none) and returns the
/// operation ids in the order given. Entries come back from `query()` in
/// append order.
pub trait OperationLog: Send + Sync {
    fn append(&self, entries: Vec<OperationLogEntry>) -> Result<Vec<OperationId>, OperationLogError>;

    fn query(&self, filter: &LogFilter) -> Result<Vec<OperationLogEntry>, OperationLogError>;
}

impl<L> OperationLog for Arc<L>
where
    L: OperationLog + ?Sized,
{
    fn append(&self, entries: Vec<OperationLogEntry>) -> Result<Vec<OperationId>, OperationLogError> {
        (**self).append(entries)
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<OperationLogEntry>, OperationLogError> {
        (**self).query(filter)
    }
}
