use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use stockcore_core::DomainResult;
use stockcore_inventory::{InventoryRecord, StockKey, StockPartition};

use super::store::{LedgerStore, LedgerStoreError, PartitionSnapshot, PartitionWrite, RecordFilter};

#[derive(Debug, Default)]
struct VersionedRecords {
    version: u64,
    records: Vec<InventoryRecord>,
}

type Slot = Arc<RwLock<VersionedRecords>>;

/// In-memory versioned ledger store.
///
/// Each partition sits behind its own lock, so commits against different keys
/// proceed in parallel. Multi-partition commits lock their keys in key order.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    partitions: RwLock<BTreeMap<StockKey, Slot>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> LedgerStoreError {
        LedgerStoreError::Unavailable("lock poisoned".to_string())
    }

    fn slot(&self, key: StockKey) -> Result<Option<Slot>, LedgerStoreError> {
        let map = self.partitions.read().map_err(|_| Self::poisoned())?;
        Ok(map.get(&key).cloned())
    }

    fn slot_or_create(&self, key: StockKey) -> Result<Slot, LedgerStoreError> {
        if let Some(slot) = self.slot(key)? {
            return Ok(slot);
        }
        let mut map = self.partitions.write().map_err(|_| Self::poisoned())?;
        Ok(map.entry(key).or_default().clone())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self, key: StockKey) -> Result<PartitionSnapshot, LedgerStoreError> {
        let Some(slot) = self.slot(key)? else {
            return Ok(PartitionSnapshot {
                version: 0,
                partition: StockPartition::new(key),
            });
        };
        let guard = slot.read().map_err(|_| Self::poisoned())?;
        Ok(PartitionSnapshot {
            version: guard.version,
            partition: StockPartition::from_records(key, guard.records.clone()),
        })
    }

    fn commit_with(
        &self,
        mut writes: Vec<PartitionWrite>,
        before_write: &mut dyn FnMut() -> DomainResult<()>,
    ) -> Result<(), LedgerStoreError> {
        if writes.is_empty() {
            return before_write().map_err(LedgerStoreError::Aborted);
        }

        let mut seen = HashSet::new();
        for w in &writes {
            if !seen.insert(w.key) {
                return Err(LedgerStoreError::InvalidWrite(format!(
                    "batch writes partition {} twice",
                    w.key
                )));
            }
            if let Some(r) = w.records.iter().find(|r| r.key() != w.key) {
                return Err(LedgerStoreError::InvalidWrite(format!(
                    "record {} does not belong to partition {}",
                    r.id(),
                    w.key
                )));
            }
        }

        // Lock in key order so concurrent multi-partition commits cannot deadlock.
        writes.sort_by_key(|w| w.key);
        let slots = writes
            .iter()
            .map(|w| self.slot_or_create(w.key))
            .collect::<Result<Vec<_>, _>>()?;
        let mut guards: Vec<RwLockWriteGuard<'_, VersionedRecords>> = slots
            .iter()
            .map(|s| s.write().map_err(|_| Self::poisoned()))
            .collect::<Result<Vec<_>, _>>()?;

        for (w, guard) in writes.iter().zip(guards.iter()) {
            if !w.expected_version.matches(guard.version) {
                return Err(LedgerStoreError::Concurrency {
                    key: w.key,
                    expected: w.expected_version,
                    actual: guard.version,
                });
            }
        }

        // Versions are settled and the slots stay locked: once the hook
        // succeeds the writes below cannot fail.
        before_write().map_err(LedgerStoreError::Aborted)?;

        for (w, guard) in writes.into_iter().zip(guards.iter_mut()) {
            guard.records = w.records;
            guard.version += 1;
        }

        Ok(())
    }

    fn scan(&self, filter: RecordFilter) -> Result<Vec<InventoryRecord>, LedgerStoreError> {
        let slots: Vec<Slot> = {
            let map = self.partitions.read().map_err(|_| Self::poisoned())?;
            map.iter()
                .filter(|(key, _)| match filter {
                    RecordFilter::Warehouse(w) => key.warehouse_id == w,
                    RecordFilter::Product(p) => key.product_id == p,
                    RecordFilter::Cell(_) => true,
                })
                .map(|(_, slot)| slot.clone())
                .collect()
        };

        let mut out = Vec::new();
        for slot in slots {
            let guard = slot.read().map_err(|_| Self::poisoned())?;
            out.extend(guard.records.iter().filter(|r| filter.matches(r)).cloned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockcore_core::{CellId, ExpectedVersion, ProductId, WarehouseId};

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    fn stocked(key: StockKey, cell: Option<CellId>, qty: i64) -> Vec<InventoryRecord> {
        let mut p = StockPartition::new(key);
        p.receive(None, cell, Decimal::from(qty), Utc::now()).unwrap();
        p.into_records()
    }

    #[test]
    fn absent_partition_loads_empty_at_version_zero() {
        let store = InMemoryLedgerStore::new();
        let snap = store.load(key()).unwrap();
        assert_eq!(snap.version, 0);
        assert!(snap.partition.is_empty());
    }

    #[test]
    fn commit_bumps_version_and_rejects_stale_writer() {
        let store = InMemoryLedgerStore::new();
        let k = key();
        store
            .commit(vec![PartitionWrite {
                key: k,
                expected_version: ExpectedVersion::NoPartition,
                records: stocked(k, None, 5),
            }])
            .unwrap();
        assert_eq!(store.load(k).unwrap().version, 1);

        let err = store
            .commit(vec![PartitionWrite {
                key: k,
                expected_version: ExpectedVersion::NoPartition,
                records: stocked(k, None, 9),
            }])
            .unwrap_err();
        assert!(err.is_concurrency());
        assert_eq!(store.load(k).unwrap().partition.quantity().unwrap(), Decimal::from(5));
    }

    #[test]
    fn multi_partition_commit_is_all_or_nothing() {
        let store = InMemoryLedgerStore::new();
        let (a, b) = (key(), key());
        store
            .commit(vec![PartitionWrite {
                key: b,
                expected_version: ExpectedVersion::NoPartition,
                records: stocked(b, None, 1),
            }])
            .unwrap();

        let err = store
            .commit(vec![
                PartitionWrite {
                    key: a,
                    expected_version: ExpectedVersion::NoPartition,
                    records: stocked(a, None, 3),
                },
                PartitionWrite {
                    key: b,
                    expected_version: ExpectedVersion::NoPartition,
                    records: stocked(b, None, 3),
                },
            ])
            .unwrap_err();
        assert!(err.is_concurrency());
        assert!(store.load(a).unwrap().partition.is_empty());
        assert_eq!(store.load(b).unwrap().partition.quantity().unwrap(), Decimal::ONE);
    }

    #[test]
    fn aborted_hook_leaves_partition_and_version_untouched() {
        let store = InMemoryLedgerStore::new();
        let k = key();
        store
            .commit(vec![PartitionWrite {
                key: k,
                expected_version: ExpectedVersion::NoPartition,
                records: stocked(k, None, 5),
            }])
            .unwrap();

        let err = store
            .commit_with(
                vec![PartitionWrite {
                    key: k,
                    expected_version: ExpectedVersion::Exact(1),
                    records: stocked(k, None, 2),
                }],
                &mut || Err(stockcore_core::DomainError::invalid_state("log down")),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::Aborted(_)));
        let snap = store.load(k).unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.partition.quantity().unwrap(), Decimal::from(5));
    }

    #[test]
    fn stale_batch_never_runs_hook() {
        let store = InMemoryLedgerStore::new();
        let k = key();
        let mut ran = false;
        let err = store
            .commit_with(
                vec![PartitionWrite {
                    key: k,
                    expected_version: ExpectedVersion::Exact(3),
                    records: stocked(k, None, 1),
                }],
                &mut || {
                    ran = true;
                    Ok(())
                },
            )
            .unwrap_err();
        assert!(err.is_concurrency());
        assert!(!ran);
    }

    #[test]
    fn rejects_records_from_another_partition() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .commit(vec![PartitionWrite {
                key: key(),
                expected_version: ExpectedVersion::Any,
                records: stocked(key(), None, 1),
            }])
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::InvalidWrite(_)));
    }

    #[test]
    fn scan_filters_by_warehouse_product_and_cell() {
        let store = InMemoryLedgerStore::new();
        let warehouse = WarehouseId::new();
        let cell = CellId::new();
        let k1 = StockKey::new(ProductId::new(), warehouse);
        let k2 = StockKey::new(ProductId::new(), warehouse);
        let k3 = StockKey::new(k1.product_id, WarehouseId::new());
        for (k, c) in [(k1, Some(cell)), (k2, None), (k3, None)] {
            store
                .commit(vec![PartitionWrite {
                    key: k,
                    expected_version: ExpectedVersion::NoPartition,
                    records: stocked(k, c, 2),
                }])
                .unwrap();
        }

        assert_eq!(store.scan(RecordFilter::Warehouse(warehouse)).unwrap().len(), 2);
        assert_eq!(store.scan(RecordFilter::Product(k1.product_id)).unwrap().len(), 2);
        let in_cell = store.scan(RecordFilter::Cell(cell)).unwrap();
        assert_eq!(in_cell.len(), 1);
        assert_eq!(in_cell[0].key(), k1);
    }
}
