//! Database operations for the storefront `PostgreSQL` database.
//!
//! # Schema: `market`
//!
//! - `zone` - Delivery polygons (`JSONB` vertex arrays) and translated names
//! - `zone_store` - Zone rosters
//! - `store`, `product`, `offer` - Sellers and their prices/stock
//! - `user` - Saved shopper location and zone
//! - `cart`, `cart_item` - Carts with location snapshot, zone and version
//! - `order`, `order_item` - Checkout snapshots
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p geomarket-cli -- migrate
//! ```
//!
//! Queries are bound at runtime (`sqlx::query_as` + `FromRow`), so building
//! the crate does not need a live database. Single-statement functions take
//! any `PgExecutor` and work on a pool or inside a transaction; functions
//! that issue several statements take a `&mut PgConnection`.

pub mod carts;
pub mod locks;
pub mod orders;
pub mod stores;
pub mod users;
pub mod zones;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unknown store in a roster).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign key violations to `Conflict`.
    pub(crate) fn from_constraint(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(what.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
