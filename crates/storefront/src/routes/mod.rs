//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Location (rate limited: each call may reach the geocoder)
//! POST   /location/check              - Zone for a location, no changes
//! POST   /location                    - Commit a location to cart and profile
//!
//! # Cart
//! GET    /cart                        - Current cart, items, zone and version
//! POST   /cart/items                  - Add an offer
//! PATCH  /cart/items/{id}             - Change quantity (0 removes)
//! DELETE /cart/items/{id}             - Remove an item
//! POST   /checkout                    - Create the order (signed-in shoppers)
//!
//! # Catalog
//! GET    /products/{id}/lowest-price  - Cheapest offer in the shopper's zone
//!
//! # Operator (bearer token)
//! GET    /admin/zones                 - List zones
//! POST   /admin/zones                 - Create a zone
//! DELETE /admin/zones/{id}            - Delete a zone
//! PUT    /admin/zones/{id}/polygon    - Replace the polygon
//! GET    /admin/zones/{id}/stores     - Stores on the roster
//! PUT    /admin/zones/{id}/stores     - Replace the roster
//! POST   /admin/zones/{id}/sync       - Run the membership sweep
//! GET    /admin/stores                - List every store
//! ```

pub mod cart;
pub mod location;
pub mod products;
pub mod zones;

use axum::{
    Router,
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};

use geomarket_core::ZoneId;

use crate::middleware::{api_rate_limiter, location_rate_limiter};
use crate::models::Zone;
use crate::state::AppState;

/// `?lang=` for localized zone names.
#[derive(Debug, Default, Deserialize)]
pub struct LangQuery {
    pub lang: Option<String>,
}

impl LangQuery {
    /// Requested language, else the configured default.
    #[must_use]
    pub fn or_default<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.lang
            .as_deref()
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or(&state.config().default_language)
    }
}

/// Zone as shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub id: ZoneId,
    pub name: String,
}

impl ZoneSummary {
    #[must_use]
    pub fn localized(zone: &Zone, lang: &str) -> Self {
        Self {
            id: zone.id,
            name: zone.display_name(lang).to_string(),
        }
    }
}

/// Create the location routes router.
pub fn location_routes() -> Router<AppState> {
    Router::new()
        .route("/location/check", post(location::check_location))
        .route("/location", post(location::commit_location))
        .layer(location_rate_limiter())
}

/// Create the cart and checkout routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/checkout", post(cart::checkout))
        .route("/products/{id}/lowest-price", get(products::lowest_price))
        .layer(api_rate_limiter())
}

/// Create the operator routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/zones", get(zones::list).post(zones::create))
        .route("/zones/{id}", axum::routing::delete(zones::delete))
        .route("/zones/{id}/polygon", put(zones::update_polygon))
        .route(
            "/zones/{id}/stores",
            get(zones::roster).put(zones::replace_roster),
        )
        .route("/zones/{id}/sync", post(zones::sync))
        .route("/stores", get(zones::list_stores))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(location_routes())
        .merge(cart_routes())
        .nest("/admin", admin_routes())
}
