//! Integration tests for Geomarket.
//!
//! # Running Tests
//!
//! ```bash
//! # Pure and fake-geocoder tests
//! cargo test -p geomarket-integration-tests
//!
//! # Database scenarios (need a Postgres `DATABASE_URL`; each test gets a
//! # fresh database with the storefront migrations applied)
//! cargo test -p geomarket-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `geofence` - Point-in-polygon and zone resolution properties
//! - `geocoding` - Nominatim client and normalizer against a local fake server
//! - `zone_membership` - Sweeps, roster pruning and zone deletion
//! - `cart_checkout` - Location commits, item gating and checkout
//! - `concurrency` - Sweeps, zone edits and checkout racing location commits
//!
//! This module holds the fixtures those tests share.

use geomarket_core::{Coordinate, Polygon, ProductId, StoreId};
use geomarket_storefront::db::{RepositoryError, stores};
use geomarket_storefront::models::{Offer, Store, Zone};
use geomarket_storefront::services::zones::{ZoneAdmin, ZoneAdminError, ZoneDraft};
use geomarket_storefront::services::{ResolvedLocation, ZoneMembershipSynchronizer};
use rust_decimal::Decimal;
use sqlx::PgPool;

/// A valid coordinate. Panics on out-of-range input, which is a test bug.
#[must_use]
#[allow(clippy::expect_used)]
pub fn coord(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).expect("fixture coordinate in range")
}

/// Axis-aligned square with its south-west corner at `(lat, lng)`.
#[must_use]
pub fn square(lat: f64, lng: f64, size: f64) -> Polygon {
    Polygon::new(vec![
        coord(lat, lng),
        coord(lat + size, lng),
        coord(lat + size, lng + size),
        coord(lat, lng + size),
    ])
}

/// A resolved location labelled with its coordinates.
#[must_use]
pub fn at(lat: f64, lng: f64) -> ResolvedLocation {
    ResolvedLocation {
        coordinate: coord(lat, lng),
        address: Some(format!("{lat}, {lng}")),
    }
}

/// A store selling one product.
pub struct StockedStore {
    pub store: Store,
    pub product_id: ProductId,
    pub offer: Offer,
}

/// Create a store with one offer of a new product.
///
/// # Errors
///
/// Returns error if a database query fails.
pub async fn stocked_store(
    pool: &PgPool,
    name: &str,
    location: Coordinate,
    price: Decimal,
    stock: i32,
) -> Result<StockedStore, RepositoryError> {
    let store = stores::create_store(pool, name, location).await?;
    let product_id = stores::create_product(pool, &format!("{name} special")).await?;
    let offer = stores::upsert_offer(pool, store.id, product_id, price, stock).await?;
    Ok(StockedStore {
        store,
        product_id,
        offer,
    })
}

/// Create a zone through the operator path and give it a roster.
///
/// # Errors
///
/// Returns error if the zone is invalid or a database query fails.
pub async fn zone_with_roster(
    pool: &PgPool,
    name: &str,
    polygon: Polygon,
    roster: Vec<StoreId>,
) -> Result<Zone, ZoneAdminError> {
    let synchronizer = ZoneMembershipSynchronizer::new(pool.clone());
    let admin = ZoneAdmin::new(pool, &synchronizer);
    let edit = admin
        .create(ZoneDraft {
            name: name.to_string(),
            translations: std::collections::BTreeMap::new(),
            polygon,
        })
        .await?;
    let edit = admin.replace_roster(edit.zone.id, roster).await?;
    Ok(edit.zone)
}
