//! Advisory locks around zone membership.
//!
//! Sweeps of the same zone are serialized; sweeps of different zones run
//! concurrently. Keys are `(ZONE_LOCK_CLASS, zone_id)` in Postgres' two-key
//! advisory lock space.
//!
//! The zone set lock orders zone edits against location commits: an edit
//! holds it exclusively until its transaction commits, and a location commit
//! holds it shared while it resolves and writes. A sweep that starts after an
//! edit commits therefore sees every location committed before the edit, and
//! any later commit resolves against the edited zones.
//!
//! Lock order, in every transaction that takes more than one of these:
//! zone set, zone, carts, users.

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};

use geomarket_core::ZoneId;

use super::RepositoryError;

/// First advisory lock key for zone locks.
const ZONE_LOCK_CLASS: i32 = 4217;

/// First advisory lock key for the zone set lock.
const ZONE_SET_LOCK_CLASS: i32 = 4218;

/// First wait between attempts on a contended sweep lock.
const SWEEP_LOCK_INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// Longest wait between attempts on a contended sweep lock.
const SWEEP_LOCK_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// A session-level advisory lock on one zone, held on a dedicated connection.
///
/// Call [`release`](Self::release) when done. If the guard is dropped instead,
/// its connection is closed rather than returned to the pool, which also
/// drops the lock.
pub struct ZoneSweepLock {
    conn: Option<PoolConnection<Postgres>>,
    zone_id: ZoneId,
}

impl ZoneSweepLock {
    /// Wait for and take the lock for `zone_id`.
    ///
    /// While another session holds the lock, no connection is kept checked
    /// out between attempts.
    ///
    /// # Errors
    ///
    /// Returns error if no connection is available or the lock query fails.
    pub async fn acquire(pool: &PgPool, zone_id: ZoneId) -> Result<Self, RepositoryError> {
        let mut backoff = SWEEP_LOCK_INITIAL_BACKOFF;
        loop {
            let mut conn = pool.acquire().await?;
            let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1, $2)")
                .bind(ZONE_LOCK_CLASS)
                .bind(zone_id)
                .fetch_one(&mut *conn)
                .await?;

            if locked {
                tracing::debug!(%zone_id, "Zone sweep lock acquired");
                return Ok(Self {
                    conn: Some(conn),
                    zone_id,
                });
            }

            drop(conn);
            tracing::debug!(%zone_id, ?backoff, "Zone sweep lock busy");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(SWEEP_LOCK_MAX_BACKOFF);
        }
    }

    /// Release the lock and return the connection to the pool.
    ///
    /// # Errors
    ///
    /// Returns error if the unlock query fails.
    pub async fn release(mut self) -> Result<(), RepositoryError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                .bind(ZONE_LOCK_CLASS)
                .bind(self.zone_id)
                .execute(&mut *conn)
                .await?;
            tracing::debug!(zone_id = %self.zone_id, "Zone sweep lock released");
        }
        Ok(())
    }
}

impl Drop for ZoneSweepLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.close_on_drop();
        }
    }
}

/// Take the zone lock for the rest of the current transaction.
///
/// Used by zone deletion, which does all its work in one transaction.
///
/// # Errors
///
/// Returns error if the lock query fails.
pub async fn lock_zone_for_transaction(
    conn: &mut PgConnection,
    zone_id: ZoneId,
) -> Result<(), RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(ZONE_LOCK_CLASS)
        .bind(zone_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Take the zone set lock exclusively for the rest of the current
/// transaction. Held by zone create, polygon and roster edits, and delete.
///
/// # Errors
///
/// Returns error if the lock query fails.
pub async fn lock_zone_set_for_edit(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, 0)")
        .bind(ZONE_SET_LOCK_CLASS)
        .execute(conn)
        .await?;
    Ok(())
}

/// Take the zone set lock shared for the rest of the current transaction.
/// Held by location commits, before any row lock.
///
/// # Errors
///
/// Returns error if the lock query fails.
pub async fn lock_zone_set_for_location(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock_shared($1, 0)")
        .bind(ZONE_SET_LOCK_CLASS)
        .execute(conn)
        .await?;
    Ok(())
}
