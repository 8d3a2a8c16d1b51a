//! Operator zone management routes.
//!
//! All handlers require `Authorization: Bearer <ADMIN_API_TOKEN>`. Every
//! edit runs the membership sweep before responding and reports its counts.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use geomarket_core::{Polygon, StoreId, ZoneId};

use crate::db::{stores, zones};
use crate::error::{AppError, Result};
use crate::middleware::RequireOperator;
use crate::models::{Store, Zone};
use crate::services::SyncReport;
use crate::services::zones::{ZoneDraft, ZoneEdit};
use crate::state::AppState;

/// Replace polygon request body.
#[derive(Debug, Deserialize)]
pub struct PolygonRequest {
    pub polygon: Polygon,
}

/// Replace roster request body.
#[derive(Debug, Deserialize)]
pub struct RosterRequest {
    pub store_ids: Vec<StoreId>,
}

/// List every zone.
pub async fn list(_: RequireOperator, State(state): State<AppState>) -> Result<Json<Vec<Zone>>> {
    Ok(Json(state.zone_admin().list().await?))
}

/// Create a zone and sweep it.
#[instrument(skip(state, draft), fields(name = %draft.name))]
pub async fn create(
    _: RequireOperator,
    State(state): State<AppState>,
    Json(draft): Json<ZoneDraft>,
) -> Result<(StatusCode, Json<ZoneEdit>)> {
    let edit = state.zone_admin().create(draft).await?;
    Ok((StatusCode::CREATED, Json(edit)))
}

/// Replace a zone's polygon and sweep it.
#[instrument(skip(state, request), fields(zone_id = %id))]
pub async fn update_polygon(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
    Json(request): Json<PolygonRequest>,
) -> Result<Json<ZoneEdit>> {
    Ok(Json(
        state.zone_admin().update_polygon(id, request.polygon).await?,
    ))
}

/// Stores on a zone's roster.
pub async fn roster(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
) -> Result<Json<Vec<Store>>> {
    if zones::get_zone(state.pool(), id).await?.is_none() {
        return Err(AppError::NotFound(format!("zone {id}")));
    }
    Ok(Json(stores::list_stores_in_zone(state.pool(), id).await?))
}

/// Replace a zone's roster and sweep it.
#[instrument(skip(state, request), fields(zone_id = %id))]
pub async fn replace_roster(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
    Json(request): Json<RosterRequest>,
) -> Result<Json<ZoneEdit>> {
    Ok(Json(
        state
            .zone_admin()
            .replace_roster(id, request.store_ids)
            .await?,
    ))
}

/// Run the sweep for a zone.
#[instrument(skip(state), fields(zone_id = %id))]
pub async fn sync(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
) -> Result<Json<SyncReport>> {
    Ok(Json(state.zone_admin().sync(id).await?))
}

/// Delete a zone; its users and carts are re-resolved first.
#[instrument(skip(state), fields(zone_id = %id))]
pub async fn delete(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
) -> Result<Json<SyncReport>> {
    Ok(Json(state.zone_admin().delete(id).await?))
}

/// Every store, for building rosters.
pub async fn list_stores(
    _: RequireOperator,
    State(state): State<AppState>,
) -> Result<Json<Vec<Store>>> {
    Ok(Json(stores::list_all_stores(state.pool()).await?))
}
