//! Location route handlers.
//!
//! `check` answers "which zone would this be?" without touching anything.
//! `commit` writes the location to the session's cart (created on demand)
//! and to the signed-in shopper's profile, pruning out-of-zone items.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use geomarket_core::{CartId, CartItemId, ZoneId};

use crate::error::Result;
use crate::middleware::{OptionalShopper, get_cart_id, set_cart_id};
use crate::routes::{LangQuery, ZoneSummary};
use crate::services::cart_guard::{LocationPreview, LocationUpdate};
use crate::services::{LocationInput, ResolvedLocation};
use crate::state::AppState;

/// Result of a dry-run zone check.
#[derive(Debug, Serialize)]
pub struct LocationCheck {
    pub location: ResolvedLocation,
    pub zone: Option<ZoneSummary>,
    pub previous_zone_id: Option<ZoneId>,
    pub zone_changed: bool,
    /// Items the current cart would lose.
    pub items_to_remove: usize,
}

impl LocationCheck {
    fn new(location: ResolvedLocation, preview: &LocationPreview, lang: &str) -> Self {
        Self {
            location,
            zone: preview.zone.as_ref().map(|z| ZoneSummary::localized(z, lang)),
            previous_zone_id: preview.previous_zone_id,
            zone_changed: preview.zone_changed,
            items_to_remove: preview.items_to_remove,
        }
    }
}

/// Result of committing a location.
#[derive(Debug, Serialize)]
pub struct LocationCommit {
    pub cart_id: CartId,
    pub location: ResolvedLocation,
    pub zone: Option<ZoneSummary>,
    pub previous_zone_id: Option<ZoneId>,
    pub zone_changed: bool,
    pub removed_items: Vec<CartItemId>,
    pub version: i32,
}

impl LocationCommit {
    fn new(location: ResolvedLocation, update: LocationUpdate, lang: &str) -> Self {
        Self {
            cart_id: update.cart_id,
            location,
            zone: update.zone.as_ref().map(|z| ZoneSummary::localized(z, lang)),
            previous_zone_id: update.previous_zone_id,
            zone_changed: update.zone_changed,
            removed_items: update.removed_items,
            version: update.version,
        }
    }
}

/// Check which zone a location falls in (no mutation).
#[instrument(skip(state, session, shopper, query, input))]
pub async fn check_location(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Query(query): Query<LangQuery>,
    Json(input): Json<LocationInput>,
) -> Result<Json<LocationCheck>> {
    let location = state.normalizer().normalize(&input).await?;

    let guard = state.cart_guard();
    let cart = guard
        .current_cart(get_cart_id(&session).await, shopper.user_id())
        .await?;
    let preview = guard.preview_location(cart.as_ref(), &location).await?;

    Ok(Json(LocationCheck::new(
        location,
        &preview,
        query.or_default(&state),
    )))
}

/// Commit a location to the cart and the signed-in shopper.
#[instrument(skip(state, session, shopper, query, input))]
pub async fn commit_location(
    State(state): State<AppState>,
    session: Session,
    shopper: OptionalShopper,
    Query(query): Query<LangQuery>,
    Json(input): Json<LocationInput>,
) -> Result<Json<LocationCommit>> {
    let location = state.normalizer().normalize(&input).await?;

    let guard = state.cart_guard();
    let cart = guard
        .ensure_cart(get_cart_id(&session).await, shopper.user_id())
        .await?;
    set_cart_id(&session, cart.id).await?;

    let update = guard
        .update_location(cart.id, shopper.user_id(), &location)
        .await?;

    Ok(Json(LocationCommit::new(
        location,
        update,
        query.or_default(&state),
    )))
}
