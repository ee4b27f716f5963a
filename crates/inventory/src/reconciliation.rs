//! Physical count reconciliation: an explicit finite-state session.
//!
//! ```text
//! IN_PROGRESS ──complete──▶ COMPLETED
//!      │
//!      └──────cancel──────▶ CANCELLED
//! ```
//!
//! Every operation validates the current state; both terminal states reject
//! further changes. Expected quantities are a best-effort snapshot taken at
//! start: stock movements between start and completion show up as
//! discrepancies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{
    CellId, CountId, DomainError, DomainResult, InventoryRecordId, LotId, ProductId, SessionId,
    UserId, WarehouseId,
};

use crate::record::InventoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
}

/// Book-vs-physical comparison for one inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    pub count_id: CountId,
    /// Ledger record the snapshot was taken from.
    pub record_id: InventoryRecordId,
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub expected_quantity: Decimal,
    pub actual_quantity: Option<Decimal>,
    pub notes: Option<String>,
}

impl CountRecord {
    fn from_snapshot(record: &InventoryRecord) -> Self {
        Self {
            count_id: CountId::new(),
            record_id: record.id(),
            product_id: record.product_id(),
            lot_id: record.lot_id(),
            cell_id: record.cell_id(),
            expected_quantity: record.quantity(),
            actual_quantity: None,
            notes: None,
        }
    }

    /// `actual - expected`, once counted.
    pub fn discrepancy(&self) -> Option<Decimal> {
        self.actual_quantity.map(|actual| actual - self.expected_quantity)
    }

    pub fn is_counted(&self) -> bool {
        self.actual_quantity.is_some()
    }
}

/// Which count record a physical count entry is for.
///
/// `lot_id` and `cell_id` narrow the match only when provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountTarget {
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
}

impl CountTarget {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            lot_id: None,
            cell_id: None,
        }
    }

    pub fn in_cell(mut self, cell_id: Option<CellId>) -> Self {
        self.cell_id = cell_id;
        self
    }

    pub fn for_lot(mut self, lot_id: Option<LotId>) -> Self {
        self.lot_id = lot_id;
        self
    }

    fn matches(&self, count: &CountRecord) -> bool {
        count.product_id == self.product_id
            && self.lot_id.is_none_or(|lot| count.lot_id == Some(lot))
            && self.cell_id.is_none_or(|cell| count.cell_id == Some(cell))
    }
}

/// A correction the session wants written back into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAdjustment {
    pub count_id: CountId,
    pub record_id: InventoryRecordId,
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub expected_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub discrepancy: Decimal,
}

/// What completing the session would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPlan {
    pub total_records: usize,
    pub adjustments: Vec<CountAdjustment>,
    pub unfilled: Vec<CountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSession {
    session_id: SessionId,
    warehouse_id: WarehouseId,
    started_by: UserId,
    started_at: DateTime<Utc>,
    completed_by: Option<UserId>,
    completed_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    notes: Option<String>,
    counts: Vec<CountRecord>,
}

impl ReconciliationSession {
    /// Open a session with one count record per snapshotted inventory record.
    pub fn start<'a>(
        warehouse_id: WarehouseId,
        started_by: UserId,
        notes: Option<String>,
        snapshot: impl IntoIterator<Item = &'a InventoryRecord>,
        at: DateTime<Utc>,
    ) -> Self {
        let counts = snapshot
            .into_iter()
            .filter(|r| r.warehouse_id() == warehouse_id)
            .map(CountRecord::from_snapshot)
            .collect();
        Self {
            session_id: SessionId::new(),
            warehouse_id,
            started_by,
            started_at: at,
            completed_by: None,
            completed_at: None,
            status: SessionStatus::InProgress,
            notes,
            counts,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn started_by(&self) -> UserId {
        self.started_by
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_by(&self) -> Option<UserId> {
        self.completed_by
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn counts(&self) -> &[CountRecord] {
        &self.counts
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    fn ensure_in_progress(&self) -> DomainResult<()> {
        if self.is_in_progress() {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "session {} is {:?}, expected InProgress",
                self.session_id, self.status
            )))
        }
    }

    /// Record a physical count. Re-recording the same target overwrites.
    pub fn record_count(
        &mut self,
        target: CountTarget,
        actual_quantity: Decimal,
        notes: Option<String>,
    ) -> DomainResult<&CountRecord> {
        self.ensure_in_progress()?;
        if actual_quantity < Decimal::ZERO {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }

        let mut matching = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, c)| target.matches(c))
            .map(|(idx, _)| idx);
        let idx = matching
            .next()
            .ok_or_else(|| DomainError::not_found("count record", target.product_id))?;
        if matching.next().is_some() {
            return Err(DomainError::validation(format!(
                "ambiguous count target for product {}: specify lot or cell",
                target.product_id
            )));
        }

        let count = &mut self.counts[idx];
        count.actual_quantity = Some(actual_quantity);
        count.notes = notes;
        Ok(count)
    }

    /// Counted records with a nonzero discrepancy, plus the ones never counted.
    pub fn completion_plan(&self) -> DomainResult<CompletionPlan> {
        self.ensure_in_progress()?;
        let mut adjustments = Vec::new();
        let mut unfilled = Vec::new();
        for count in &self.counts {
            match (count.actual_quantity, count.discrepancy()) {
                (Some(actual), Some(diff)) if !diff.is_zero() => adjustments.push(CountAdjustment {
                    count_id: count.count_id,
                    record_id: count.record_id,
                    product_id: count.product_id,
                    lot_id: count.lot_id,
                    cell_id: count.cell_id,
                    expected_quantity: count.expected_quantity,
                    actual_quantity: actual,
                    discrepancy: diff,
                }),
                (None, _) => unfilled.push(count.count_id),
                _ => {}
            }
        }
        Ok(CompletionPlan {
            total_records: self.counts.len(),
            adjustments,
            unfilled,
        })
    }

    pub fn complete(&mut self, actor_id: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_in_progress()?;
        self.status = SessionStatus::Completed;
        self.completed_by = Some(actor_id);
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_in_progress()?;
        self.status = SessionStatus::Cancelled;
        self.completed_at = Some(at);
        Ok(())
    }
}

/// One applied correction, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub expected_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub discrepancy: Decimal,
    /// Ledger quantity immediately before the correction was written.
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub session_id: SessionId,
    pub total_records: usize,
    pub unfilled_records: usize,
    pub discrepancies_count: usize,
    pub discrepancies: Vec<Discrepancy>,
}
