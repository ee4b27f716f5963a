//! Reconciliation sessions: warehouse-wide physical counts.
//!
//! At most one session per warehouse may be in progress. Sessions do not block
//! ordinary receive/ship traffic; expected quantities are a best-effort
//! snapshot, so movements during the count surface as discrepancies.
//!
//! Lock order is ledger slots, then the session registry, then the operation
//! log. The registry lock is never held while waiting on the ledger.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;

use stockcore_core::{
    CellId, DomainError, DomainResult, LotId, OperationGroupId, ProductId, SessionId, UserId,
    WarehouseId,
};
use stockcore_inventory::{
    BatchRegistry, CountRecord, CountTarget, Discrepancy, ReconciliationSession,
    ReconciliationSummary, StockKey,
};

use super::{AdjustmentLine, InventoryService, adjustment_keys};
use crate::catalog::ProductCatalog;
use crate::ledger::{LedgerStore, RecordFilter};
use crate::operation_log::OperationLog;

/// In-memory session storage, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,
}

type Sessions = HashMap<SessionId, ReconciliationSession>;

impl SessionRegistry {
    fn read(&self) -> DomainResult<RwLockReadGuard<'_, Sessions>> {
        self.sessions
            .read()
            .map_err(|_| DomainError::invalid_state("session registry lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, Sessions>> {
        self.sessions
            .write()
            .map_err(|_| DomainError::invalid_state("session registry lock poisoned"))
    }

    fn get(&self, session_id: SessionId) -> DomainResult<ReconciliationSession> {
        let sessions = self.read()?;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("session", session_id))
    }

    fn for_warehouse(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<ReconciliationSession>> {
        let sessions = self.read()?;
        let mut out: Vec<_> = sessions
            .values()
            .filter(|s| s.warehouse_id() == warehouse_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.started_at());
        Ok(out)
    }
}

impl<S, L, C, B> InventoryService<S, L, C, B>
where
    S: LedgerStore,
    L: OperationLog,
    C: ProductCatalog,
    B: BatchRegistry,
{
    /// Open a count for `warehouse_id`, snapshotting every record there.
    pub fn start_inventory(
        &self,
        warehouse_id: WarehouseId,
        actor_id: UserId,
        notes: Option<String>,
    ) -> DomainResult<SessionId> {
        let snapshot = self.ledger.records(RecordFilter::Warehouse(warehouse_id))?;

        // Check-then-insert under one registry lock.
        let mut sessions = self.sessions.write()?;
        if let Some(open) = sessions
            .values()
            .find(|s| s.warehouse_id() == warehouse_id && s.is_in_progress())
        {
            return Err(DomainError::conflict(format!(
                "session {} is already in progress for warehouse {warehouse_id}",
                open.session_id()
            )));
        }
        let session = ReconciliationSession::start(warehouse_id, actor_id, notes, &snapshot, Utc::now());
        let session_id = session.session_id();
        sessions.insert(session_id, session);

        tracing::info!(%session_id, %warehouse_id, records = snapshot.len(), "inventory count started");
        Ok(session_id)
    }

    /// Record a physical count for the product (narrowed by lot/cell when given).
    pub fn record_actual_count(
        &self,
        session_id: SessionId,
        product_id: ProductId,
        lot_id: Option<LotId>,
        cell_id: Option<CellId>,
        actual_quantity: Decimal,
        notes: Option<String>,
    ) -> DomainResult<CountRecord> {
        let mut sessions = self.sessions.write()?;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| DomainError::not_found("session", session_id))?;
        let target = CountTarget::product(product_id).for_lot(lot_id).in_cell(cell_id);
        let count = session.record_count(target, actual_quantity, notes)?.clone();

        tracing::info!(
            %session_id,
            %product_id,
            expected = %count.expected_quantity,
            actual = %actual_quantity,
            "count recorded"
        );
        Ok(count)
    }

    /// Write counted quantities back into the ledger and close the session.
    ///
    /// Counts never filled in are skipped. Nothing is written if any
    /// correction is rejected (e.g. the counted quantity is below what is
    /// currently reserved).
    pub fn complete_inventory(
        &self,
        session_id: SessionId,
        actor_id: UserId,
    ) -> DomainResult<ReconciliationSummary> {
        let (plan, warehouse_id) = {
            let sessions = self.sessions.read()?;
            let session = sessions
                .get(&session_id)
                .ok_or_else(|| DomainError::not_found("session", session_id))?;
            (session.completion_plan()?, session.warehouse_id())
        };

        if !plan.unfilled.is_empty() {
            tracing::warn!(
                %session_id,
                unfilled = plan.unfilled.len(),
                "completing with unfilled count records"
            );
        }

        let group_id = OperationGroupId::new();
        let lines: Vec<AdjustmentLine> = plan
            .adjustments
            .iter()
            .map(|adj| AdjustmentLine {
                key: StockKey::new(adj.product_id, warehouse_id),
                record_id: Some(adj.record_id),
                lot_id: adj.lot_id,
                cell_id: adj.cell_id,
                new_quantity: adj.actual_quantity,
                notes: Some(format!("reconciliation {session_id}")),
            })
            .collect();
        let now = Utc::now();

        // The session is closed inside the ledger commit, after checking it is
        // still open with the counts the plan was built from.
        let batch = self.ledger.update_many_with(
            &adjustment_keys(&lines),
            |partitions| self.decide_adjustments(partitions, &lines, actor_id, Some(group_id), now),
            |batch| {
                let mut sessions = self.sessions.write()?;
                let session = sessions
                    .get_mut(&session_id)
                    .ok_or_else(|| DomainError::not_found("session", session_id))?;
                if session.completion_plan()? != plan {
                    return Err(DomainError::conflict(format!(
                        "counts for session {session_id} changed during completion"
                    )));
                }
                self.publish(&batch.entries)?;
                session.complete(actor_id, now)
            },
        )?;
        let applied = batch.into_applied(&lines);

        let discrepancies: Vec<Discrepancy> = plan
            .adjustments
            .iter()
            .zip(&applied)
            .map(|(adj, done)| Discrepancy {
                product_id: adj.product_id,
                lot_id: adj.lot_id,
                cell_id: adj.cell_id,
                expected_quantity: adj.expected_quantity,
                actual_quantity: adj.actual_quantity,
                discrepancy: adj.discrepancy,
                quantity_before: done.quantity_before,
                quantity_after: done.quantity_after,
            })
            .collect();

        tracing::info!(
            %session_id,
            %warehouse_id,
            total = plan.total_records,
            discrepancies = discrepancies.len(),
            "inventory count completed"
        );
        Ok(ReconciliationSummary {
            session_id,
            total_records: plan.total_records,
            unfilled_records: plan.unfilled.len(),
            discrepancies_count: discrepancies.len(),
            discrepancies,
        })
    }

    /// Abandon the count. The ledger is left untouched.
    pub fn cancel_inventory(&self, session_id: SessionId) -> DomainResult<()> {
        let mut sessions = self.sessions.write()?;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| DomainError::not_found("session", session_id))?;
        session.cancel(Utc::now())?;
        tracing::info!(%session_id, "inventory count cancelled");
        Ok(())
    }

    pub fn get_session(&self, session_id: SessionId) -> DomainResult<ReconciliationSession> {
        self.sessions.get(session_id)
    }

    /// All sessions ever opened for the warehouse, oldest first.
    pub fn sessions_for_warehouse(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<ReconciliationSession>> {
        self.sessions.for_warehouse(warehouse_id)
    }

    pub fn count_records(&self, session_id: SessionId) -> DomainResult<Vec<CountRecord>> {
        Ok(self.sessions.get(session_id)?.counts().to_vec())
    }
}
