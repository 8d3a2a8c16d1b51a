//! Operator zone management.
//!
//! Every polygon or roster edit is followed by a membership sweep of the
//! edited zone. Deleting a zone reassigns or clears its members and prunes
//! their carts in the same transaction as the delete.
//!
//! Each edit holds the zone set lock exclusively until it commits, so no
//! location commit that resolved against the old zones is still in flight
//! when the follow-up sweep lists members.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use geomarket_core::reconcile::plan_sweep;
use geomarket_core::{Coordinate, Polygon, StoreId, ZoneId};

use crate::db::zones::NewZone;
use crate::db::{RepositoryError, carts, locks, users, zones};
use crate::models::Zone;
use crate::services::zone_sync::{
    SyncError, SyncReport, ZoneMembershipSynchronizer, reconcile_cart_in, reconcile_user_in,
};

/// Errors from zone management.
#[derive(Debug, Error)]
pub enum ZoneAdminError {
    #[error("{0}")]
    Validation(String),

    #[error("zone {0} not found")]
    NotFound(ZoneId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<sqlx::Error> for ZoneAdminError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Operator input for a new zone.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDraft {
    pub name: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub polygon: Polygon,
}

/// A zone after an edit, with the sweep that followed it.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneEdit {
    pub zone: Zone,
    pub roster: Vec<StoreId>,
    pub sync: SyncReport,
}

/// Reject vertices that are not valid coordinates.
///
/// Fewer than three vertices is allowed; such a zone simply covers nothing.
fn validate_polygon(polygon: &Polygon) -> Result<(), ZoneAdminError> {
    for (index, vertex) in polygon.vertices().iter().enumerate() {
        Coordinate::new(vertex.lat, vertex.lng)
            .map_err(|e| ZoneAdminError::Validation(format!("vertex {index}: {e}")))?;
    }
    Ok(())
}

fn normalize_translations(translations: BTreeMap<String, String>) -> BTreeMap<String, String> {
    translations
        .into_iter()
        .map(|(lang, name)| (lang.trim().to_lowercase(), name.trim().to_owned()))
        .filter(|(lang, name)| !lang.is_empty() && !name.is_empty())
        .collect()
}

fn not_found(id: ZoneId) -> impl FnOnce(RepositoryError) -> ZoneAdminError {
    move |e| match e {
        RepositoryError::NotFound => ZoneAdminError::NotFound(id),
        e => ZoneAdminError::Repository(e),
    }
}

/// Zone edits and the sweeps they trigger.
pub struct ZoneAdmin<'a> {
    pool: &'a PgPool,
    synchronizer: &'a ZoneMembershipSynchronizer,
}

impl<'a> ZoneAdmin<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, synchronizer: &'a ZoneMembershipSynchronizer) -> Self {
        Self { pool, synchronizer }
    }

    /// Every zone.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Zone>, ZoneAdminError> {
        Ok(zones::list_zones(self.pool).await?)
    }

    /// Create a zone and sweep it.
    ///
    /// # Errors
    ///
    /// Returns `ZoneAdminError::Validation` for a blank name or invalid vertex.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: ZoneDraft) -> Result<ZoneEdit, ZoneAdminError> {
        let name = draft.name.trim().to_owned();
        if name.is_empty() {
            return Err(ZoneAdminError::Validation("name is required".to_string()));
        }
        validate_polygon(&draft.polygon)?;

        let mut tx = self.pool.begin().await?;
        locks::lock_zone_set_for_edit(&mut *tx).await?;
        let zone = zones::create_zone(
            &mut *tx,
            &NewZone {
                name,
                translations: normalize_translations(draft.translations),
                polygon: draft.polygon,
            },
        )
        .await?;
        tx.commit().await?;
        tracing::info!(zone_id = %zone.id, vertices = zone.polygon.vertices().len(), "Zone created");

        self.finish_edit(zone.id).await
    }

    /// Replace a zone's polygon and sweep it.
    ///
    /// # Errors
    ///
    /// Returns `ZoneAdminError::NotFound` for an unknown zone and
    /// `ZoneAdminError::Validation` for an invalid vertex.
    #[instrument(skip(self, polygon), fields(zone_id = %id))]
    pub async fn update_polygon(
        &self,
        id: ZoneId,
        polygon: Polygon,
    ) -> Result<ZoneEdit, ZoneAdminError> {
        validate_polygon(&polygon)?;
        let mut tx = self.pool.begin().await?;
        locks::lock_zone_set_for_edit(&mut *tx).await?;
        zones::lock_zone(&mut *tx, id).await.map_err(not_found(id))?;
        zones::update_polygon(&mut *tx, id, &polygon)
            .await
            .map_err(not_found(id))?;
        tx.commit().await?;
        tracing::info!(vertices = polygon.vertices().len(), "Zone polygon replaced");

        self.finish_edit(id).await
    }

    /// Replace a zone's roster and sweep it.
    ///
    /// # Errors
    ///
    /// Returns `ZoneAdminError::NotFound` for an unknown zone and
    /// `ZoneAdminError::Validation` for an unknown store.
    #[instrument(skip(self, store_ids), fields(zone_id = %id, stores = store_ids.len()))]
    pub async fn replace_roster(
        &self,
        id: ZoneId,
        store_ids: Vec<StoreId>,
    ) -> Result<ZoneEdit, ZoneAdminError> {
        let mut tx = self.pool.begin().await?;
        locks::lock_zone_set_for_edit(&mut *tx).await?;
        zones::lock_zone(&mut *tx, id).await.map_err(not_found(id))?;
        zones::replace_roster(&mut *tx, id, &store_ids)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(msg) => ZoneAdminError::Validation(msg),
                e => ZoneAdminError::Repository(e),
            })?;
        tx.commit().await?;
        tracing::info!("Zone roster replaced");

        self.finish_edit(id).await
    }

    /// Run the sweep for a zone without editing it.
    ///
    /// # Errors
    ///
    /// Returns `ZoneAdminError::NotFound` for an unknown zone.
    pub async fn sync(&self, id: ZoneId) -> Result<SyncReport, ZoneAdminError> {
        self.synchronizer.sync(id).await.map_err(|e| match e {
            SyncError::ZoneNotFound(id) => ZoneAdminError::NotFound(id),
            e => ZoneAdminError::Sync(e),
        })
    }

    /// Delete a zone.
    ///
    /// Its users and open carts are re-resolved against the remaining zones
    /// and their carts pruned, all in the delete's transaction. A cart left
    /// without a zone loses every item.
    ///
    /// # Errors
    ///
    /// Returns `ZoneAdminError::NotFound` for an unknown zone.
    #[instrument(skip(self), fields(zone_id = %id))]
    pub async fn delete(&self, id: ZoneId) -> Result<SyncReport, ZoneAdminError> {
        let mut tx = self.pool.begin().await?;
        locks::lock_zone_set_for_edit(&mut *tx).await?;
        locks::lock_zone_for_transaction(&mut *tx, id).await?;
        zones::lock_zone(&mut *tx, id).await.map_err(not_found(id))?;

        let remaining: Vec<Zone> = zones::list_zones(&mut *tx)
            .await?
            .into_iter()
            .filter(|zone| zone.id != id)
            .collect();
        let user_members = users::list_users_by_zone_or_with_coordinates(&mut *tx, id, None).await?;
        let cart_members =
            carts::list_open_carts_by_zone_or_with_coordinates(&mut *tx, id, None).await?;
        let plan = plan_sweep(id, &remaining, &user_members, &cart_members);

        let mut report = SyncReport {
            zone_id: Some(id),
            ..SyncReport::default()
        };
        // Carts before users: the same row lock order as a location commit.
        for cart in &plan.carts {
            let outcome = reconcile_cart_in(&mut *tx, cart.id, &remaining).await?;
            report.record_cart(outcome);
        }
        for user in &plan.users {
            let outcome = reconcile_user_in(&mut *tx, user.id, &remaining).await?;
            report.record_user(outcome);
        }

        zones::delete_zone(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            users_reassigned = report.users_reassigned,
            carts_reassigned = report.carts_reassigned,
            items_pruned = report.items_pruned,
            "Zone deleted"
        );
        Ok(report)
    }

    async fn finish_edit(&self, id: ZoneId) -> Result<ZoneEdit, ZoneAdminError> {
        let sync = self.sync(id).await?;
        let zone = zones::get_zone(self.pool, id)
            .await?
            .ok_or(ZoneAdminError::NotFound(id))?;
        let roster: Vec<StoreId> = zones::roster(self.pool, id).await?.into_iter().collect();
        Ok(ZoneEdit { zone, roster, sync })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_polygon_rejects_out_of_range_vertex() {
        let polygon = Polygon::new(vec![
            Coordinate { lat: 0.0, lng: 0.0 },
            Coordinate { lat: 95.0, lng: 0.0 },
            Coordinate { lat: 0.0, lng: 1.0 },
        ]);
        let err = validate_polygon(&polygon).unwrap_err();
        assert!(err.to_string().starts_with("vertex 1:"));
    }

    #[test]
    fn test_validate_polygon_allows_degenerate() {
        assert!(validate_polygon(&Polygon::default()).is_ok());
        let two = Polygon::new(vec![
            Coordinate { lat: 0.0, lng: 0.0 },
            Coordinate { lat: 1.0, lng: 1.0 },
        ]);
        assert!(validate_polygon(&two).is_ok());
    }

    #[test]
    fn test_normalize_translations() {
        let translations: BTreeMap<String, String> = [
            (" FR ".to_string(), " Centre-ville ".to_string()),
            ("de".to_string(), "  ".to_string()),
        ]
        .into_iter()
        .collect();
        let normalized = normalize_translations(translations);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.get("fr").map(String::as_str), Some("Centre-ville"));
    }

    #[test]
    fn test_zone_draft_defaults() {
        let draft: ZoneDraft = serde_json::from_str(r#"{"name":"Downtown"}"#).unwrap();
        assert_eq!(draft.name, "Downtown");
        assert!(draft.translations.is_empty());
        assert!(!draft.polygon.is_valid());
    }
}
