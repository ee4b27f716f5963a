//! External collaborators consulted by the core: product existence and lot
//! metadata. The core never owns these; the in-memory versions back tests/dev.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use stockcore_core::{DomainError, DomainResult, LotId, ProductId};
use stockcore_inventory::{BatchRegistry, Lot};

/// Product existence check (catalog metadata lives elsewhere).
pub trait ProductCatalog: Send + Sync {
    fn product_exists(&self, product_id: &ProductId) -> bool;
}

impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    fn product_exists(&self, product_id: &ProductId) -> bool {
        (**self).product_exists(product_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashSet<ProductId>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, product_id: ProductId) -> DomainResult<()> {
        self.products
            .write()
            .map_err(|_| DomainError::invalid_state("product catalog lock poisoned"))?
            .insert(product_id);
        Ok(())
    }
}

impl ProductCatalog for InMemoryProductCatalog {
    fn product_exists(&self, product_id: &ProductId) -> bool {
        self.products
            .read()
            .map(|p| p.contains(product_id))
            .unwrap_or(false)
    }
}

/// In-memory batch registry. Lots are immutable once registered.
#[derive(Debug, Default)]
pub struct InMemoryBatchRegistry {
    lots: RwLock<HashMap<LotId, Lot>>,
}

impl InMemoryBatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, lot: Lot) -> DomainResult<()> {
        let mut lots = self
            .lots
            .write()
            .map_err(|_| DomainError::invalid_state("batch registry lock poisoned"))?;
        if lots.contains_key(&lot.lot_id) {
            return Err(DomainError::conflict(format!(
                "lot {} is already registered",
                lot.lot_id
            )));
        }
        lots.insert(lot.lot_id, lot);
        Ok(())
    }
}

impl BatchRegistry for InMemoryBatchRegistry {
    fn get_lot(&self, lot_id: &LotId) -> Option<Lot> {
        let lots = self.lots.read().ok()?;
        lots.get(lot_id).cloned()
    }
}
