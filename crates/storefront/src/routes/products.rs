//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use geomarket_core::{Price, ProductId, ZoneId};

use crate::db::{stores, users};
use crate::error::{AppError, Result};
use crate::middleware::{OptionalShopper, get_cart_id};
use crate::models::ZoneOffer;
use crate::state::AppState;

/// Cheapest in-stock offer for a product in the shopper's zone.
#[derive(Debug, Serialize)]
pub struct LowestPrice {
    pub product_id: ProductId,
    /// The zone searched; `None` when the shopper has no zone yet.
    pub zone_id: Option<ZoneId>,
    /// `None` when no store in the zone has the product in stock.
    pub offer: Option<ZoneOffer>,
    pub price: Option<Price>,
}

/// Lowest price for a product in the shopper's current zone.
///
/// The zone is the session cart's, else the signed-in shopper's profile zone.
#[instrument(skip(state, session, shopper), fields(product_id = %product_id))]
pub async fn lowest_price(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Path(product_id): Path<ProductId>,
) -> Result<Json<LowestPrice>> {
    if !stores::product_exists(state.pool(), product_id).await? {
        return Err(AppError::NotFound(format!("product {product_id}")));
    }

    let cart = state
        .cart_guard()
        .current_cart(get_cart_id(&session).await, shopper.user_id())
        .await?;
    let zone_id = match (cart.and_then(|c| c.zone_id), shopper.user_id()) {
        (Some(zone_id), _) => Some(zone_id),
        (None, Some(user_id)) => users::get_user(state.pool(), user_id)
            .await?
            .and_then(|u| u.zone_id),
        (None, None) => None,
    };

    let offer = match zone_id {
        Some(zone_id) => stores::lowest_price_in_zone(state.pool(), product_id, zone_id).await?,
        None => None,
    };
    let currency = state.config().currency;

    Ok(Json(LowestPrice {
        product_id,
        zone_id,
        price: offer.as_ref().map(|o| Price::new(o.price, currency)),
        offer,
    }))
}
