//! Operation requests accepted by the inventory core.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcore_core::{CellId, LotId, ProductId, UserId, WarehouseId};

/// Command: ReceiveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub lot_id: Option<LotId>,
    pub cell_id: Option<CellId>,
    pub quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

/// Command: ShipStock (receipt-order path, optionally from one cell).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub cell_id: Option<CellId>,
    pub quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

/// Command: ShipWithFefo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipWithFefo {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

/// Command: AdjustStock (set a lot slot's on-hand quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub lot_id: Option<LotId>,
    pub new_quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
}
