//! Order queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use geomarket_core::{
    CartId, Coordinate, CurrencyCode, OfferId, OrderId, OrderItemId, ProductId, StoreId, UserId,
    ZoneId,
};

use super::RepositoryError;
use crate::models::cart::total;
use crate::models::{Cart, CartItem, Order, OrderItem};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    cart_id: CartId,
    user_id: Option<UserId>,
    zone_id: Option<ZoneId>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    total: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    product_id: ProductId,
    offer_id: OfferId,
    store_id: StoreId,
    quantity: i32,
    unit_price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            offer_id: row.offer_id,
            store_id: row.store_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

fn into_order(row: OrderRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let currency = row.currency.parse::<CurrencyCode>().map_err(|e| {
        RepositoryError::DataCorruption(format!("order {} currency: {e}", row.id))
    })?;

    Ok(Order {
        id: row.id,
        cart_id: row.cart_id,
        user_id: row.user_id,
        zone_id: row.zone_id,
        address: row.address,
        location: Coordinate::from_columns(row.latitude, row.longitude),
        total: row.total,
        currency,
        items,
        created_at: row.created_at,
    })
}

async fn list_order_items(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, product_id, offer_id, store_id, quantity, unit_price
        FROM market.order_item
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// Create an order snapshotting `cart` and its `items`.
///
/// Run in the same transaction that marks the cart completed.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the cart already has an order.
pub async fn create_order(
    conn: &mut PgConnection,
    cart: &Cart,
    items: &[CartItem],
    currency: CurrencyCode,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(
        r"
        INSERT INTO market.order
            (cart_id, user_id, zone_id, address, latitude, longitude, total, currency)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, cart_id, user_id, zone_id, address, latitude, longitude,
                  total, currency, created_at
        ",
    )
    .bind(cart.id)
    .bind(cart.user_id)
    .bind(cart.zone_id)
    .bind(cart.address.as_deref())
    .bind(cart.location.map(|c| c.lat))
    .bind(cart.location.map(|c| c.lng))
    .bind(total(items))
    .bind(currency.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "cart already has an order"))?;

    let product_ids: Vec<i32> = items.iter().map(|i| i.product_id.as_i32()).collect();
    let offer_ids: Vec<i32> = items.iter().map(|i| i.offer_id.as_i32()).collect();
    let store_ids: Vec<i32> = items.iter().map(|i| i.store_id.as_i32()).collect();
    let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
    let unit_prices: Vec<Decimal> = items.iter().map(|i| i.unit_price).collect();

    let item_rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        INSERT INTO market.order_item
            (order_id, product_id, offer_id, store_id, quantity, unit_price)
        SELECT $1, * FROM UNNEST($2::INT4[], $3::INT4[], $4::INT4[], $5::INT4[], $6::NUMERIC[])
        RETURNING id, product_id, offer_id, store_id, quantity, unit_price
        ",
    )
    .bind(row.id)
    .bind(product_ids)
    .bind(offer_ids)
    .bind(store_ids)
    .bind(quantities)
    .bind(unit_prices)
    .fetch_all(&mut *conn)
    .await?;

    into_order(row, item_rows.into_iter().map(OrderItem::from).collect())
}

/// The order created from a cart, if checkout already succeeded.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn find_order_for_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(
        r"
        SELECT id, cart_id, user_id, zone_id, address, latitude, longitude,
               total, currency, created_at
        FROM market.order
        WHERE cart_id = $1
        ",
    )
    .bind(cart_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let items = list_order_items(conn, row.id).await?;
            into_order(row, items).map(Some)
        }
        None => Ok(None),
    }
}
