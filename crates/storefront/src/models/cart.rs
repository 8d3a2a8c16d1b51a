//! Cart and cart item models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use geomarket_core::reconcile::ItemPlacement;
use geomarket_core::{
    CartId, CartItemId, CartStatus, Coordinate, OfferId, ProductId, StoreId, UserId, ZoneId,
};

/// A shopping cart and its delivery location snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub status: CartStatus,
    pub address: Option<String>,
    pub location: Option<Coordinate>,
    pub zone_id: Option<ZoneId>,
    /// Incremented by every zone-affecting write.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line in a cart, with the store that sells it.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub offer_id: OfferId,
    pub store_id: StoreId,
    pub quantity: i32,
    /// Offer price captured when the item was added.
    pub unit_price: Decimal,
}

impl CartItem {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// The parts of this item zone validation looks at.
    #[must_use]
    pub const fn placement(&self) -> ItemPlacement {
        ItemPlacement {
            id: self.id,
            store_id: self.store_id,
        }
    }
}

/// Sum of line totals.
#[must_use]
pub fn total(items: &[CartItem]) -> Decimal {
    items.iter().map(CartItem::line_total).sum()
}
