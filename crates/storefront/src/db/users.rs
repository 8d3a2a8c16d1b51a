//! User location and zone queries.

use sqlx::{PgConnection, PgExecutor};

use geomarket_core::reconcile::Member;
use geomarket_core::{Bounds, Coordinate, UserId, ZoneId};

use super::RepositoryError;
use crate::models::User;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    zone_id: Option<ZoneId>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            address: row.address,
            location: Coordinate::from_columns(row.latitude, row.longitude),
            zone_id: row.zone_id,
        }
    }
}

impl From<UserRow> for Member<UserId> {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            zone_id: row.zone_id,
            coordinate: Coordinate::from_columns(row.latitude, row.longitude),
        }
    }
}

/// Get a user by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_user(
    executor: impl PgExecutor<'_>,
    id: UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, address, latitude, longitude, zone_id FROM market.user WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(User::from))
}

/// Get a user and lock the row for the rest of the transaction.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn lock_user(conn: &mut PgConnection, id: UserId) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
        r"
        SELECT id, address, latitude, longitude, zone_id
        FROM market.user
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(User::from))
}

/// Create a user with no saved location.
///
/// Accounts are owned by the authentication collaborator; this exists for
/// seeding and tests.
///
/// # Errors
///
/// Returns error if the database insert fails.
pub async fn create_user(executor: impl PgExecutor<'_>) -> Result<User, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
        r"
        INSERT INTO market.user DEFAULT VALUES
        RETURNING id, address, latitude, longitude, zone_id
        ",
    )
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

/// Save a user's address, coordinate and resolved zone.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn update_user_location(
    executor: impl PgExecutor<'_>,
    id: UserId,
    address: Option<&str>,
    location: Option<Coordinate>,
    zone_id: Option<ZoneId>,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE market.user
        SET address = $2, latitude = $3, longitude = $4, zone_id = $5, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(address)
    .bind(location.map(|c| c.lat))
    .bind(location.map(|c| c.lng))
    .bind(zone_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Set a user's zone, leaving the saved location alone.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn update_user_zone(
    executor: impl PgExecutor<'_>,
    id: UserId,
    zone_id: Option<ZoneId>,
) -> Result<(), RepositoryError> {
    let result =
        sqlx::query("UPDATE market.user SET zone_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(zone_id)
            .execute(executor)
            .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Users assigned to `zone_id`, plus users whose saved coordinate lies in
/// `bounds`. The exact polygon test happens in the sweep planner.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn list_users_by_zone_or_with_coordinates(
    executor: impl PgExecutor<'_>,
    zone_id: ZoneId,
    bounds: Option<Bounds>,
) -> Result<Vec<Member<UserId>>, RepositoryError> {
    let rows = sqlx::query_as::<_, UserRow>(
        r"
        SELECT id, address, latitude, longitude, zone_id
        FROM market.user
        WHERE zone_id = $1
           OR ($2::FLOAT8 IS NOT NULL
               AND latitude BETWEEN $2 AND $3
               AND longitude BETWEEN $4 AND $5)
        ORDER BY id
        ",
    )
    .bind(zone_id)
    .bind(bounds.map(|b| b.min_lat))
    .bind(bounds.map(|b| b.max_lat))
    .bind(bounds.map(|b| b.min_lng))
    .bind(bounds.map(|b| b.max_lng))
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Member::from).collect())
}
