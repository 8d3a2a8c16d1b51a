//! Store, offer and price queries.

use rust_decimal::Decimal;
use sqlx::PgExecutor;

use geomarket_core::{Coordinate, OfferId, ProductId, StoreId, ZoneId};

use super::RepositoryError;
use crate::models::{Offer, Store, ZoneOffer};

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    name: String,
    latitude: f64,
    longitude: f64,
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let location = Coordinate::new(row.latitude, row.longitude).map_err(|e| {
            RepositoryError::DataCorruption(format!("store {} location: {e}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            location,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: OfferId,
    store_id: StoreId,
    product_id: ProductId,
    price: Decimal,
    stock: i32,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            product_id: row.product_id,
            price: row.price,
            stock: row.stock,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ZoneOfferRow {
    offer_id: OfferId,
    store_id: StoreId,
    store_name: String,
    price: Decimal,
}

/// List every store.
///
/// # Errors
///
/// Returns error if the query fails or a stored coordinate is out of range.
pub async fn list_all_stores(executor: impl PgExecutor<'_>) -> Result<Vec<Store>, RepositoryError> {
    sqlx::query_as::<_, StoreRow>(
        "SELECT id, name, latitude, longitude FROM market.store ORDER BY id",
    )
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(Store::try_from)
    .collect()
}

/// List the stores on a zone's roster.
///
/// # Errors
///
/// Returns error if the query fails or a stored coordinate is out of range.
pub async fn list_stores_in_zone(
    executor: impl PgExecutor<'_>,
    zone_id: ZoneId,
) -> Result<Vec<Store>, RepositoryError> {
    sqlx::query_as::<_, StoreRow>(
        r"
        SELECT s.id, s.name, s.latitude, s.longitude
        FROM market.store s
        JOIN market.zone_store zs ON zs.store_id = s.id
        WHERE zs.zone_id = $1
        ORDER BY s.id
        ",
    )
    .bind(zone_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(Store::try_from)
    .collect()
}

/// Get an offer by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_offer(
    executor: impl PgExecutor<'_>,
    id: OfferId,
) -> Result<Option<Offer>, RepositoryError> {
    let row = sqlx::query_as::<_, OfferRow>(
        "SELECT id, store_id, product_id, price, stock FROM market.offer WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Offer::from))
}

/// Whether a product exists.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn product_exists(
    executor: impl PgExecutor<'_>,
    id: ProductId,
) -> Result<bool, RepositoryError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM market.product WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

/// The cheapest in-stock offer for `product_id` among the zone's roster.
///
/// Ties go to the lowest offer ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn lowest_price_in_zone(
    executor: impl PgExecutor<'_>,
    product_id: ProductId,
    zone_id: ZoneId,
) -> Result<Option<ZoneOffer>, RepositoryError> {
    let row = sqlx::query_as::<_, ZoneOfferRow>(
        r"
        SELECT o.id AS offer_id, o.store_id, s.name AS store_name, o.price
        FROM market.offer o
        JOIN market.store s ON s.id = o.store_id
        JOIN market.zone_store zs ON zs.store_id = o.store_id
        WHERE o.product_id = $1
          AND zs.zone_id = $2
          AND o.stock > 0
        ORDER BY o.price, o.id
        LIMIT 1
        ",
    )
    .bind(product_id)
    .bind(zone_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| ZoneOffer {
        offer_id: row.offer_id,
        store_id: row.store_id,
        store_name: row.store_name,
        price: row.price,
    }))
}

/// Create a store.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn create_store(
    executor: impl PgExecutor<'_>,
    name: &str,
    location: Coordinate,
) -> Result<Store, RepositoryError> {
    sqlx::query_as::<_, StoreRow>(
        r"
        INSERT INTO market.store (name, latitude, longitude)
        VALUES ($1, $2, $3)
        RETURNING id, name, latitude, longitude
        ",
    )
    .bind(name)
    .bind(location.lat)
    .bind(location.lng)
    .fetch_one(executor)
    .await?
    .try_into()
}

/// Create a product.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn create_product(
    executor: impl PgExecutor<'_>,
    name: &str,
) -> Result<ProductId, RepositoryError> {
    let id = sqlx::query_scalar::<_, ProductId>(
        "INSERT INTO market.product (name) VALUES ($1) RETURNING id",
    )
    .bind(name)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Create or reprice a store's offer for a product.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` for an unknown store or product.
pub async fn upsert_offer(
    executor: impl PgExecutor<'_>,
    store_id: StoreId,
    product_id: ProductId,
    price: Decimal,
    stock: i32,
) -> Result<Offer, RepositoryError> {
    let row = sqlx::query_as::<_, OfferRow>(
        r"
        INSERT INTO market.offer (store_id, product_id, price, stock)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (store_id, product_id)
        DO UPDATE SET price = EXCLUDED.price, stock = EXCLUDED.stock
        RETURNING id, store_id, product_id, price, stock
        ",
    )
    .bind(store_id)
    .bind(product_id)
    .bind(price)
    .bind(stock)
    .fetch_one(executor)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "unknown store or product"))?;

    Ok(Offer::from(row))
}
