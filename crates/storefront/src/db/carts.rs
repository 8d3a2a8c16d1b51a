//! Cart and cart item queries.
//!
//! Every write that changes a cart's zone or drops items because of it
//! increments `cart.version`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};

use geomarket_core::reconcile::Member;
use geomarket_core::{
    Bounds, CartId, CartItemId, CartStatus, Coordinate, OfferId, ProductId, StoreId, UserId,
    ZoneId, raw_ids,
};

use super::RepositoryError;
use crate::models::{Cart, CartItem, Offer};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: Option<UserId>,
    status: CartStatus,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    zone_id: Option<ZoneId>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            address: row.address,
            location: Coordinate::from_columns(row.latitude, row.longitude),
            zone_id: row.zone_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<CartRow> for Member<CartId> {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            zone_id: row.zone_id,
            coordinate: Coordinate::from_columns(row.latitude, row.longitude),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    offer_id: OfferId,
    store_id: StoreId,
    quantity: i32,
    unit_price: Decimal,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            offer_id: row.offer_id,
            store_id: row.store_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

fn open_statuses() -> Vec<String> {
    CartStatus::open_statuses()
        .map(|status| status.as_str().to_owned())
        .collect()
}

/// Get a cart by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_cart(
    executor: impl PgExecutor<'_>,
    id: CartId,
) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, status, address, latitude, longitude, zone_id, version,
               created_at, updated_at
        FROM market.cart
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Cart::from))
}

/// Get a cart and lock the row for the rest of the transaction.
///
/// Location changes, item edits, sweep steps and checkout all take this lock,
/// so they never interleave on one cart.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn lock_cart(conn: &mut PgConnection, id: CartId) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, status, address, latitude, longitude, zone_id, version,
               created_at, updated_at
        FROM market.cart
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Cart::from))
}

/// Create an empty cart in `shopping` status.
///
/// # Errors
///
/// Returns error if the database insert fails.
pub async fn create_cart(
    executor: impl PgExecutor<'_>,
    user_id: Option<UserId>,
) -> Result<Cart, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        INSERT INTO market.cart (user_id)
        VALUES ($1)
        RETURNING id, user_id, status, address, latitude, longitude, zone_id, version,
                  created_at, updated_at
        ",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "unknown user"))?;

    Ok(row.into())
}

/// The most recent open cart owned by a user.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn find_open_cart_for_user(
    executor: impl PgExecutor<'_>,
    user_id: UserId,
) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, status, address, latitude, longitude, zone_id, version,
               created_at, updated_at
        FROM market.cart
        WHERE user_id = $1 AND status::TEXT = ANY($2)
        ORDER BY updated_at DESC, id DESC
        LIMIT 1
        ",
    )
    .bind(user_id)
    .bind(open_statuses())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Cart::from))
}

/// Attach an anonymous cart to a user.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn assign_owner(
    executor: impl PgExecutor<'_>,
    id: CartId,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE market.cart SET user_id = $2, updated_at = NOW() WHERE id = $1 AND user_id IS NULL",
    )
    .bind(id)
    .bind(user_id)
    .execute(executor)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "unknown user"))?;

    Ok(())
}

/// Write a cart's zone and location snapshot. Returns the new version.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the cart does not exist.
pub async fn update_cart_zone_and_location(
    executor: impl PgExecutor<'_>,
    id: CartId,
    zone_id: Option<ZoneId>,
    address: Option<&str>,
    location: Option<Coordinate>,
) -> Result<i32, RepositoryError> {
    sqlx::query_scalar::<_, i32>(
        r"
        UPDATE market.cart
        SET zone_id = $2, address = $3, latitude = $4, longitude = $5,
            version = version + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING version
        ",
    )
    .bind(id)
    .bind(zone_id)
    .bind(address)
    .bind(location.map(|c| c.lat))
    .bind(location.map(|c| c.lng))
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Set a cart's zone, leaving the location snapshot alone. Returns the new
/// version.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the cart does not exist.
pub async fn update_cart_zone(
    executor: impl PgExecutor<'_>,
    id: CartId,
    zone_id: Option<ZoneId>,
) -> Result<i32, RepositoryError> {
    sqlx::query_scalar::<_, i32>(
        r"
        UPDATE market.cart
        SET zone_id = $2, version = version + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING version
        ",
    )
    .bind(id)
    .bind(zone_id)
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Increment a cart's version. Returns the new version.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the cart does not exist.
pub async fn bump_version(executor: impl PgExecutor<'_>, id: CartId) -> Result<i32, RepositoryError> {
    sqlx::query_scalar::<_, i32>(
        r"
        UPDATE market.cart
        SET version = version + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING version
        ",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Mark a cart `completed`. Returns the new version.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the cart does not exist.
pub async fn mark_completed(
    executor: impl PgExecutor<'_>,
    id: CartId,
) -> Result<i32, RepositoryError> {
    sqlx::query_scalar::<_, i32>(
        r"
        UPDATE market.cart
        SET status = 'completed', version = version + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING version
        ",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// A cart's items with the store each offer belongs to.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn list_cart_items_with_store(
    executor: impl PgExecutor<'_>,
    cart_id: CartId,
) -> Result<Vec<CartItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT ci.id, ci.cart_id, ci.product_id, ci.offer_id, o.store_id,
               ci.quantity, ci.unit_price
        FROM market.cart_item ci
        JOIN market.offer o ON o.id = ci.offer_id
        WHERE ci.cart_id = $1
        ORDER BY ci.id
        ",
    )
    .bind(cart_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(CartItem::from).collect())
}

/// Delete the cart's items whose store is not on `zone_id`'s roster, judged
/// against the roster as it is when the statement runs. With no zone every
/// item goes. Returns the removed item IDs.
///
/// # Errors
///
/// Returns error if the database delete fails.
pub async fn prune_items_outside_zone(
    executor: impl PgExecutor<'_>,
    cart_id: CartId,
    zone_id: Option<ZoneId>,
) -> Result<Vec<CartItemId>, RepositoryError> {
    let removed = sqlx::query_scalar::<_, CartItemId>(
        r"
        DELETE FROM market.cart_item ci
        USING market.offer o
        WHERE ci.cart_id = $1
          AND o.id = ci.offer_id
          AND ($2::INT4 IS NULL OR NOT EXISTS (
              SELECT 1 FROM market.zone_store zs
              WHERE zs.zone_id = $2 AND zs.store_id = o.store_id
          ))
        RETURNING ci.id
        ",
    )
    .bind(cart_id)
    .bind(zone_id)
    .fetch_all(executor)
    .await?;

    Ok(removed)
}

/// Delete specific items from a cart. Returns the IDs actually removed.
///
/// # Errors
///
/// Returns error if the database delete fails.
pub async fn delete_cart_items(
    executor: impl PgExecutor<'_>,
    cart_id: CartId,
    ids: &[CartItemId],
) -> Result<Vec<CartItemId>, RepositoryError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let removed = sqlx::query_scalar::<_, CartItemId>(
        r"
        DELETE FROM market.cart_item
        WHERE cart_id = $1 AND id = ANY($2)
        RETURNING id
        ",
    )
    .bind(cart_id)
    .bind(raw_ids(ids))
    .fetch_all(executor)
    .await?;

    Ok(removed)
}

/// Add `quantity` of an offer to a cart, snapshotting the offer's price.
///
/// If the offer is already in the cart its quantity grows and the original
/// price snapshot is kept.
///
/// # Errors
///
/// Returns error if the database upsert fails.
pub async fn add_item(
    executor: impl PgExecutor<'_>,
    cart_id: CartId,
    offer: &Offer,
    quantity: i32,
) -> Result<CartItem, RepositoryError> {
    let row = sqlx::query_as::<_, CartItemRow>(
        r"
        WITH upserted AS (
            INSERT INTO market.cart_item (cart_id, product_id, offer_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cart_id, offer_id)
            DO UPDATE SET quantity = market.cart_item.quantity + EXCLUDED.quantity
            RETURNING id, cart_id, product_id, offer_id, quantity, unit_price
        )
        SELECT u.id, u.cart_id, u.product_id, u.offer_id, o.store_id, u.quantity, u.unit_price
        FROM upserted u
        JOIN market.offer o ON o.id = u.offer_id
        ",
    )
    .bind(cart_id)
    .bind(offer.product_id)
    .bind(offer.id)
    .bind(quantity)
    .bind(offer.price)
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

/// Set an item's quantity.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the item is not in the cart.
pub async fn set_item_quantity(
    executor: impl PgExecutor<'_>,
    cart_id: CartId,
    item_id: CartItemId,
    quantity: i32,
) -> Result<CartItem, RepositoryError> {
    sqlx::query_as::<_, CartItemRow>(
        r"
        WITH updated AS (
            UPDATE market.cart_item
            SET quantity = $3
            WHERE id = $2 AND cart_id = $1
            RETURNING id, cart_id, product_id, offer_id, quantity, unit_price
        )
        SELECT u.id, u.cart_id, u.product_id, u.offer_id, o.store_id, u.quantity, u.unit_price
        FROM updated u
        JOIN market.offer o ON o.id = u.offer_id
        ",
    )
    .bind(cart_id)
    .bind(item_id)
    .bind(quantity)
    .fetch_optional(executor)
    .await?
    .map(CartItem::from)
    .ok_or(RepositoryError::NotFound)
}

/// Open carts assigned to `zone_id`, plus open carts whose coordinate lies in
/// `bounds`. The exact polygon test happens in the sweep planner.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn list_open_carts_by_zone_or_with_coordinates(
    executor: impl PgExecutor<'_>,
    zone_id: ZoneId,
    bounds: Option<Bounds>,
) -> Result<Vec<Member<CartId>>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, status, address, latitude, longitude, zone_id, version,
               created_at, updated_at
        FROM market.cart
        WHERE status::TEXT = ANY($1)
          AND (zone_id = $2
               OR ($3::FLOAT8 IS NOT NULL
                   AND latitude BETWEEN $3 AND $4
                   AND longitude BETWEEN $5 AND $6))
        ORDER BY id
        ",
    )
    .bind(open_statuses())
    .bind(zone_id)
    .bind(bounds.map(|b| b.min_lat))
    .bind(bounds.map(|b| b.max_lat))
    .bind(bounds.map(|b| b.min_lng))
    .bind(bounds.map(|b| b.max_lng))
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Member::from).collect())
}
