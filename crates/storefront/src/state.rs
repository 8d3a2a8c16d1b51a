//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::geocoding::{GeocoderError, NominatimGeocoder};
use crate::services::{CartZoneGuard, LocationNormalizer, ZoneAdmin, ZoneMembershipSynchronizer};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    normalizer: LocationNormalizer<NominatimGeocoder>,
    synchronizer: ZoneMembershipSynchronizer,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the geocoding HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, GeocoderError> {
        let geocoder = NominatimGeocoder::new(&config.geocoder)?;
        let normalizer = LocationNormalizer::from_config(geocoder, &config.geocoder);
        let synchronizer = ZoneMembershipSynchronizer::new(pool.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                normalizer,
                synchronizer,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the location normalizer.
    #[must_use]
    pub fn normalizer(&self) -> &LocationNormalizer<NominatimGeocoder> {
        &self.inner.normalizer
    }

    /// Cart/zone guard over the shared pool.
    #[must_use]
    pub fn cart_guard(&self) -> CartZoneGuard<'_> {
        CartZoneGuard::new(&self.inner.pool)
    }

    /// Zone management over the shared pool and synchronizer.
    #[must_use]
    pub fn zone_admin(&self) -> ZoneAdmin<'_> {
        ZoneAdmin::new(&self.inner.pool, &self.inner.synchronizer)
    }
}
