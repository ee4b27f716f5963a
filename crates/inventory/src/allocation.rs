//! Shipment allocation: which records a shipment draws from, and how much.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{CellId, DomainError, DomainResult, InventoryRecordId, LotId};

use crate::lot::{BatchRegistry, ExpiryRank};
use crate::record::{InventoryRecord, StockPartition};

/// Order in which records are drawn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// First-expired-first-out. Ties keep receipt order.
    Fefo,
    /// Receipt order, optionally restricted to the records in one cell.
    ReceiptOrder { cell_id: Option<CellId> },
}

/// One slice of a shipment taken from one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub record_id: InventoryRecordId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub quantity: Decimal,
    pub expiry_date: Option<NaiveDate>,
    /// The lot was already past its expiry date; it is still allocated.
    pub expired: bool,
}

/// Result of allocation: slices summing exactly to `requested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested: Decimal,
    pub allocations: Vec<Allocation>,
}

impl AllocationPlan {
    pub fn total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    pub fn has_expired_lots(&self) -> bool {
        self.allocations.iter().any(|a| a.expired)
    }

    /// Draw the planned quantities from `partition`.
    ///
    /// Every slice is re-validated against the partition's current availability
    /// first; if any slice no longer fits, the whole plan is rejected and the
    /// partition is left untouched.
    pub fn apply(&self, partition: &mut StockPartition, at: DateTime<Utc>) -> DomainResult<()> {
        for a in &self.allocations {
            let record = partition
                .record(a.record_id)
                .ok_or_else(|| DomainError::not_found("inventory record", a.record_id))?;
            if a.quantity > record.available() {
                return Err(DomainError::insufficient(self.requested, partition.available()?));
            }
        }
        for a in &self.allocations {
            partition.record_mut(a.record_id)?.withdraw(a.quantity, at)?;
        }
        Ok(())
    }
}

/// Decide which records satisfy `required` units under `policy`.
///
/// - No candidate records at all: `NotFound` (no stock at this warehouse).
/// - Candidates exist but hold less than `required`: `InsufficientStock`
///   carrying the amount that was actually available.
pub fn allocate<R>(
    partition: &StockPartition,
    lots: &R,
    required: Decimal,
    policy: AllocationPolicy,
    today: NaiveDate,
) -> DomainResult<AllocationPlan>
where
    R: BatchRegistry + ?Sized,
{
    if required <= Decimal::ZERO {
        return Err(DomainError::validation("shipment quantity must be positive"));
    }

    let candidates: Vec<&InventoryRecord> = match policy {
        AllocationPolicy::Fefo => partition.records().iter().collect(),
        AllocationPolicy::ReceiptOrder { cell_id: None } => partition.records().iter().collect(),
        AllocationPolicy::ReceiptOrder { cell_id: Some(cell) } => partition
            .records()
            .iter()
            .filter(|r| r.cell_id() == Some(cell))
            .collect(),
    };
    if candidates.is_empty() {
        return Err(DomainError::not_found("inventory record", partition.key()));
    }

    let mut ranked: Vec<(ExpiryRank, bool, &InventoryRecord)> = candidates
        .into_iter()
        .map(|record| {
            let lot = record.lot_id().and_then(|id| lots.get_lot(&id));
            let expired = lot.as_ref().is_some_and(|l| l.is_expired_on(today));
            (ExpiryRank::of(lot.as_ref()), expired, record)
        })
        .collect();

    if policy == AllocationPolicy::Fefo {
        // Stable: equal ranks keep receipt order.
        ranked.sort_by_key(|(rank, _, _)| *rank);
    }

    let mut remaining = required;
    let mut allocations = Vec::new();
    for (rank, expired, record) in ranked {
        if remaining.is_zero() {
            break;
        }
        let available = record.available();
        if available <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(available);
        allocations.push(Allocation {
            record_id: record.id(),
            lot_id: record.lot_id(),
            cell_id: record.cell_id(),
            quantity: take,
            expiry_date: rank.expiry_date(),
            expired,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        return Err(DomainError::insufficient(required, required - remaining));
    }

    Ok(AllocationPlan {
        requested: required,
        allocations,
    })
}
