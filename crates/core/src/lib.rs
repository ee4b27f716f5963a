//! `stockcore-core` — foundation building blocks for the inventory core.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy and optimistic-concurrency expectations.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{
    CellId, CountId, InventoryRecordId, LotId, OperationGroupId, OperationId, ProductId,
    SessionId, UserId, WarehouseId,
};
pub use version::ExpectedVersion;
