//! Cart route handlers.
//!
//! The cart id is stored in the session. Every edit goes through
//! `CartZoneGuard`, which keeps the items on the cart's zone roster.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use geomarket_core::{CartItemId, OfferId, Price};

use crate::db::zones;
use crate::error::{AppError, Result, set_sentry_user};
use crate::middleware::{
    OptionalShopper, RequireShopper, clear_cart_id, get_cart_id, set_cart_id,
};
use crate::models::{Cart, CartItem, Order};
use crate::routes::{LangQuery, ZoneSummary};
use crate::services::cart_guard::CartView;
use crate::state::AppState;

/// Cart as returned to the shopper.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    /// `None` until the shopper first commits a location or adds an item.
    pub cart: Option<Cart>,
    pub zone: Option<ZoneSummary>,
    pub items: Vec<CartItem>,
    pub total: Price,
}

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub offer_id: OfferId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

async fn session_cart(state: &AppState, session: &Session, shopper: &OptionalShopper) -> Result<Cart> {
    state
        .cart_guard()
        .current_cart(get_cart_id(session).await, shopper.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound("cart".to_string()))
}

/// Show the current cart.
#[instrument(skip(state, session, shopper, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Query(query): Query<LangQuery>,
) -> Result<Json<CartResponse>> {
    let currency = state.config().currency;
    let guard = state.cart_guard();

    let Some(cart) = guard
        .current_cart(get_cart_id(&session).await, shopper.user_id())
        .await?
    else {
        return Ok(Json(CartResponse {
            cart: None,
            zone: None,
            items: Vec::new(),
            total: Price::new(rust_decimal::Decimal::ZERO, currency),
        }));
    };

    let zone = match cart.zone_id {
        Some(id) => zones::get_zone(state.pool(), id)
            .await?
            .map(|z| ZoneSummary::localized(&z, query.or_default(&state))),
        None => None,
    };

    let CartView { cart, items, total } = guard.view(cart).await?;
    Ok(Json(CartResponse {
        cart: Some(cart),
        zone,
        items,
        total: Price::new(total, currency),
    }))
}

/// Add an offer to the cart, creating the cart if needed.
#[instrument(skip(state, session, shopper))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>)> {
    let guard = state.cart_guard();
    let cart = guard
        .ensure_cart(get_cart_id(&session).await, shopper.user_id())
        .await?;
    set_cart_id(&session, cart.id).await?;

    let item = guard
        .add_item(cart.id, shopper.user_id(), request.offer_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Change an item's quantity. Zero removes it and returns `null`.
#[instrument(skip(state, session, shopper))]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Path(item_id): Path<CartItemId>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<Option<CartItem>>> {
    let cart = session_cart(&state, &session, &shopper).await?;
    let item = state
        .cart_guard()
        .update_item_quantity(cart.id, shopper.user_id(), item_id, request.quantity)
        .await?;
    Ok(Json(item))
}

/// Remove an item from the cart.
#[instrument(skip(state, session, shopper))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Path(item_id): Path<CartItemId>,
) -> Result<StatusCode> {
    let cart = session_cart(&state, &session, &shopper).await?;
    state
        .cart_guard()
        .remove_item(cart.id, shopper.user_id(), item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check out the current cart.
///
/// A 409 response lists the items that were removed; the shopper reviews
/// the cart and retries.
#[instrument(skip(state, session, shopper), fields(user_id = %shopper.id))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    RequireShopper(shopper): RequireShopper,
) -> Result<(StatusCode, Json<Order>)> {
    set_sentry_user(&shopper.id);

    let guard = state.cart_guard();
    let cart = guard
        .current_cart(get_cart_id(&session).await, Some(shopper.id))
        .await?
        .ok_or_else(|| AppError::NotFound("cart".to_string()))?;

    let order = guard
        .checkout(cart.id, shopper.id, state.config().currency)
        .await?;
    clear_cart_id(&session).await?;

    Ok((StatusCode::CREATED, Json(order)))
}
