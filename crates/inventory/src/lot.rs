//! Lot (batch) metadata and the expiry ranking used by FEFO allocation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{LotId, ProductId};

/// Immutable lot metadata, owned by the batch registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub purchase_price: Option<Decimal>,
}

impl Lot {
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < today)
    }
}

/// Read-only lot lookup consulted by allocation.
pub trait BatchRegistry: Send + Sync {
    fn get_lot(&self, lot_id: &LotId) -> Option<Lot>;
}

impl<R> BatchRegistry for std::sync::Arc<R>
where
    R: BatchRegistry + ?Sized,
{
    fn get_lot(&self, lot_id: &LotId) -> Option<Lot> {
        (**self).get_lot(lot_id)
    }
}

/// Sort key for FEFO ordering.
///
/// Named rule "undated sorts last": stock without a lot, with an unknown lot,
/// or with a lot that has no expiry date ranks as `Undated`, which orders after
/// every `Dated` rank. Already-expired dates keep their natural (earliest)
/// position; expiry never excludes a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExpiryRank {
    Dated(NaiveDate),
    Undated,
}

impl ExpiryRank {
    pub fn of(lot: Option<&Lot>) -> Self {
        match lot.and_then(|l| l.expiry_date) {
            Some(date) => ExpiryRank::Dated(date),
            None => ExpiryRank::Undated,
        }
    }

    pub fn expiry_date(self) -> Option<NaiveDate> {
        match self {
            ExpiryRank::Dated(date) => Some(date),
            ExpiryRank::Undated => None,
        }
    }
}
