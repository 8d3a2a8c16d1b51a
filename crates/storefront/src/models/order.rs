//! Orders created by checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use geomarket_core::{
    CartId, Coordinate, CurrencyCode, OfferId, OrderId, OrderItemId, ProductId, StoreId, UserId,
    ZoneId,
};

/// A placed order. At most one exists per cart.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub cart_id: CartId,
    pub user_id: Option<UserId>,
    pub zone_id: Option<ZoneId>,
    pub address: Option<String>,
    pub location: Option<Coordinate>,
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of one cart item at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub offer_id: OfferId,
    pub store_id: StoreId,
    pub quantity: i32,
    pub unit_price: Decimal,
}
