//! Stores and their offers.

use rust_decimal::Decimal;
use serde::Serialize;

use geomarket_core::{Coordinate, OfferId, ProductId, StoreId};

/// A participating store.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub location: Coordinate,
}

/// A store's price and stock for one product.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub id: OfferId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub price: Decimal,
    pub stock: i32,
}

impl Offer {
    /// Whether `quantity` units can be taken from stock.
    #[must_use]
    pub const fn has_stock_for(&self, quantity: i32) -> bool {
        quantity > 0 && quantity <= self.stock
    }
}

/// The cheapest in-stock offer for a product within a zone.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneOffer {
    pub offer_id: OfferId,
    pub store_id: StoreId,
    pub store_name: String,
    pub price: Decimal,
}
