//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod zones;

use geomarket_storefront::config::StorefrontConfig;
use geomarket_storefront::db;
use sqlx::PgPool;

/// Connect using `GEOMARKET_DATABASE_URL` (or `DATABASE_URL`).
async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let database_url = StorefrontConfig::database_url_from_env()?;
    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
