//! Zone and roster queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor};

use geomarket_core::{Polygon, Roster, StoreId, ZoneId, raw_ids};

use super::RepositoryError;
use crate::models::Zone;

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: ZoneId,
    name: String,
    translations: Json<BTreeMap<String, String>>,
    polygon: Json<Polygon>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ZoneRow> for Zone {
    fn from(row: ZoneRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            translations: row.translations.0,
            polygon: row.polygon.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Parameters for creating a zone.
#[derive(Debug, Clone)]
pub struct NewZone {
    pub name: String,
    pub translations: BTreeMap<String, String>,
    pub polygon: Polygon,
}

/// List every zone, oldest first.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn list_zones(executor: impl PgExecutor<'_>) -> Result<Vec<Zone>, RepositoryError> {
    let rows = sqlx::query_as::<_, ZoneRow>(
        r"
        SELECT id, name, translations, polygon, created_at, updated_at
        FROM market.zone
        ORDER BY id
        ",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Zone::from).collect())
}

/// Get a zone by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_zone(
    executor: impl PgExecutor<'_>,
    id: ZoneId,
) -> Result<Option<Zone>, RepositoryError> {
    let row = sqlx::query_as::<_, ZoneRow>(
        r"
        SELECT id, name, translations, polygon, created_at, updated_at
        FROM market.zone
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Zone::from))
}

/// Lock a zone row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the zone does not exist.
pub async fn lock_zone(conn: &mut PgConnection, id: ZoneId) -> Result<Zone, RepositoryError> {
    sqlx::query_as::<_, ZoneRow>(
        r"
        SELECT id, name, translations, polygon, created_at, updated_at
        FROM market.zone
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Zone::from)
    .ok_or(RepositoryError::NotFound)
}

/// Create a zone with an empty roster.
///
/// # Errors
///
/// Returns error if the database insert fails.
pub async fn create_zone(
    executor: impl PgExecutor<'_>,
    zone: &NewZone,
) -> Result<Zone, RepositoryError> {
    let row = sqlx::query_as::<_, ZoneRow>(
        r"
        INSERT INTO market.zone (name, translations, polygon)
        VALUES ($1, $2, $3)
        RETURNING id, name, translations, polygon, created_at, updated_at
        ",
    )
    .bind(&zone.name)
    .bind(Json(&zone.translations))
    .bind(Json(&zone.polygon))
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

/// Replace a zone's polygon.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the zone does not exist.
pub async fn update_polygon(
    executor: impl PgExecutor<'_>,
    id: ZoneId,
    polygon: &Polygon,
) -> Result<Zone, RepositoryError> {
    sqlx::query_as::<_, ZoneRow>(
        r"
        UPDATE market.zone
        SET polygon = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, translations, polygon, created_at, updated_at
        ",
    )
    .bind(id)
    .bind(Json(polygon))
    .fetch_optional(executor)
    .await?
    .map(Zone::from)
    .ok_or(RepositoryError::NotFound)
}

/// Delete a zone. Rosters cascade; users and carts lose the zone via
/// `ON DELETE SET NULL`.
///
/// # Errors
///
/// Returns error if the database delete fails.
pub async fn delete_zone(
    executor: impl PgExecutor<'_>,
    id: ZoneId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM market.zone WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// The stores currently permitted to sell into a zone.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn roster(executor: impl PgExecutor<'_>, id: ZoneId) -> Result<Roster, RepositoryError> {
    let store_ids = sqlx::query_scalar::<_, StoreId>(
        "SELECT store_id FROM market.zone_store WHERE zone_id = $1",
    )
    .bind(id)
    .fetch_all(executor)
    .await?;

    Ok(store_ids.into_iter().collect())
}

/// Replace a zone's roster with `store_ids`.
///
/// Run inside a transaction so the roster is never observed half-written.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a store does not exist.
pub async fn replace_roster(
    conn: &mut PgConnection,
    id: ZoneId,
    store_ids: &[StoreId],
) -> Result<Roster, RepositoryError> {
    sqlx::query("DELETE FROM market.zone_store WHERE zone_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r"
        INSERT INTO market.zone_store (zone_id, store_id)
        SELECT $1, store_id FROM UNNEST($2::INT4[]) AS store_id
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(id)
    .bind(raw_ids(store_ids))
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "unknown store in roster"))?;

    sqlx::query("UPDATE market.zone SET updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(store_ids.iter().copied().collect())
}
