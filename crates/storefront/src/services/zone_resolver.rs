//! Zone resolution against persisted zones.
//!
//! Reads the current zone set on every call. Polygons are never cached, so an
//! operator edit is visible to the very next lookup.

use sqlx::PgExecutor;
use tracing::instrument;

use geomarket_core::{Coordinate, resolve};

use crate::db::{RepositoryError, zones};
use crate::models::Zone;

/// Find the zone governing `point`.
///
/// Overlaps go to the smallest polygon, then the lowest zone ID.
///
/// # Errors
///
/// Returns error if the zones cannot be loaded.
#[instrument(skip(executor))]
pub async fn find_zone_for_point(
    executor: impl PgExecutor<'_>,
    point: Coordinate,
) -> Result<Option<Zone>, RepositoryError> {
    let all = zones::list_zones(executor).await?;
    let found = resolve(&point, &all).cloned();
    tracing::debug!(zone_id = ?found.as_ref().map(|z| z.id), "Resolved zone");
    Ok(found)
}
