//! Inventory ledger: the single source of truth for on-hand and promised stock.
//!
//! Every write goes through [`Ledger::update`] (or [`Ledger::update_many`]):
//!
//! ```text
//! load partition(s) + version
//!   ↓
//! decide on a private copy (pure domain logic; business errors abort here)
//!   ↓
//! commit with ExpectedVersion::Exact(version)
//!   ↓ concurrency failure
//! reload and decide again (bounded), then give up with Contention
//! ```
//!
//! A decision that fails never reaches the store, so each call is
//! all-or-nothing. Two writers on the same key cannot both commit a decision
//! made against the same read.
//!
//! [`Ledger::update_many_with`] also takes a `publish` step (the operation log
//! append) that runs inside the store's commit once the versions are settled.
//! If it fails, the partitions are not written.

pub mod in_memory;
pub mod store;

use std::collections::BTreeMap;

use stockcore_core::{DomainError, DomainResult, ExpectedVersion, InventoryRecordId};
use stockcore_inventory::{InventoryRecord, StockKey, StockLevel, StockMutation, StockPartition};

pub use in_memory::InMemoryLedgerStore;
pub use store::{LedgerStore, LedgerStoreError, PartitionSnapshot, PartitionWrite, RecordFilter};

#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
    max_retries: u32,
}

impl<S> Ledger<S> {
    pub fn new(store: S, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Ledger<S>
where
    S: LedgerStore,
{
    /// Aggregated quantity view for one key. `NotFound` if nothing was ever received.
    pub fn get(&self, key: StockKey) -> DomainResult<StockLevel> {
        let snap = self.store.load(key)?;
        if snap.partition.is_empty() {
            return Err(DomainError::not_found("inventory record", key));
        }
        snap.partition.level()
    }

    pub fn records(&self, filter: RecordFilter) -> DomainResult<Vec<InventoryRecord>> {
        Ok(self.store.scan(filter)?)
    }

    /// The write primitive: one signed change against one lot slot of `key`.
    pub fn mutate(&self, key: StockKey, mutation: StockMutation) -> DomainResult<InventoryRecordId> {
        self.update(key, |partition| partition.apply(mutation, chrono::Utc::now()))
    }

    /// Run `decide` against a fresh copy of the partition and commit the result.
    ///
    /// `decide` may run more than once (after a lost race); it must derive
    /// everything from the partition it is handed.
    pub fn update<T, F>(&self, key: StockKey, decide: F) -> DomainResult<T>
    where
        F: FnMut(&mut StockPartition) -> DomainResult<T>,
    {
        self.update_with(key, decide, |_| Ok(()))
    }

    /// Single-key form of [`Ledger::update_many_with`].
    pub fn update_with<T, F, P>(&self, key: StockKey, mut decide: F, publish: P) -> DomainResult<T>
    where
        F: FnMut(&mut StockPartition) -> DomainResult<T>,
        P: FnMut(&T) -> DomainResult<()>,
    {
        self.update_many_with(
            &[key],
            |partitions| {
                let partition = partitions
                    .get_mut(&key)
                    .ok_or_else(|| DomainError::not_found("stock partition", key))?;
                decide(partition)
            },
            publish,
        )
    }

    /// Like [`Ledger::update`], atomically across several keys.
    pub fn update_many<T, F>(&self, keys: &[StockKey], decide: F) -> DomainResult<T>
    where
        F: FnMut(&mut BTreeMap<StockKey, StockPartition>) -> DomainResult<T>,
    {
        self.update_many_with(keys, decide, |_| Ok(()))
    }

    /// Like [`Ledger::update_many`], with `publish` run against the final
    /// outcome inside the commit. `publish` runs at most once, and only for
    /// the attempt that is about to be written.
    pub fn update_many_with<T, F, P>(
        &self,
        keys: &[StockKey],
        mut decide: F,
        mut publish: P,
    ) -> DomainResult<T>
    where
        F: FnMut(&mut BTreeMap<StockKey, StockPartition>) -> DomainResult<T>,
        P: FnMut(&T) -> DomainResult<()>,
    {
        for attempt in 0..=self.max_retries {
            let mut versions = BTreeMap::new();
            let mut partitions = BTreeMap::new();
            for key in keys {
                let snap = self.store.load(*key)?;
                versions.insert(*key, snap.version);
                partitions.insert(*key, snap.partition);
            }

            let outcome = decide(&mut partitions)?;

            let writes = partitions
                .into_iter()
                .filter_map(|(key, partition)| {
                    let version = versions.get(&key).copied()?;
                    Some(PartitionWrite {
                        key,
                        expected_version: ExpectedVersion::from_read(version),
                        records: partition.into_records(),
                    })
                })
                .collect();

            let committed = self.store.commit_with(writes, &mut || publish(&outcome));
            match committed {
                Ok(()) => return Ok(outcome),
                Err(e) if e.is_concurrency() => {
                    tracing::debug!(attempt, error = %e, "ledger commit lost a race; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            keys = keys.len(),
            retries = self.max_retries,
            "ledger commit retries exhausted"
        );
        Err(DomainError::contention(format!(
            "gave up after {} retries",
            self.max_retries
        )))
    }
}
