//! Location normalization.
//!
//! Turns what a shopper supplied (a coordinate, address fragments, or both)
//! into a validated coordinate plus a display address. Every collaborator
//! call is bounded by the configured timeout; successful lookups are cached.

use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use geomarket_core::Coordinate;

use crate::config::GeocoderConfig;
use crate::geocoding::{AddressFragments, GeocodedAddress, Geocoder};

const MAX_CACHE_ENTRIES: u64 = 10_000;

/// Errors from location normalization.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The input carries no usable coordinate or address.
    #[error("{0}")]
    Validation(String),

    /// The geocoder found nothing, failed, or timed out. Retryable.
    #[error("geocoding failed: {0}")]
    GeocodeFailure(String),
}

/// What a shopper sent as their delivery location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationInput {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<AddressFragments>,
}

impl LocationInput {
    /// The validated coordinate, if one was supplied.
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Validation` if only one component is present or
    /// the values are out of range.
    pub fn coordinate(&self) -> Result<Option<Coordinate>, LocationError> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Coordinate::new(lat, lng)
                .map(Some)
                .map_err(|e| LocationError::Validation(e.to_string())),
            (None, None) => Ok(None),
            _ => Err(LocationError::Validation(
                "latitude and longitude must be given together".to_string(),
            )),
        }
    }

    /// The supplied address fragments, if any are non-blank.
    #[must_use]
    pub fn address(&self) -> Option<&AddressFragments> {
        self.address.as_ref().filter(|address| !address.is_empty())
    }
}

/// A normalized delivery location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    /// Display address. `None` when only a coordinate was supplied and the
    /// reverse lookup found nothing.
    pub address: Option<String>,
}

/// Cache key for reverse lookups: the coordinate to about 0.1 m.
type CoordinateKey = (i64, i64);

#[allow(clippy::cast_possible_truncation)] // |degrees| * 1e6 fits comfortably in i64
fn coordinate_key(point: Coordinate) -> CoordinateKey {
    (
        (point.lat * 1e6).round() as i64,
        (point.lng * 1e6).round() as i64,
    )
}

/// Geocoding front end with timeout and caching.
pub struct LocationNormalizer<G> {
    geocoder: G,
    timeout: Duration,
    forward: Cache<String, GeocodedAddress>,
    reverse: Cache<CoordinateKey, String>,
}

impl<G: Geocoder> LocationNormalizer<G> {
    /// Create a normalizer around `geocoder`.
    #[must_use]
    pub fn new(geocoder: G, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            geocoder,
            timeout,
            forward: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(cache_ttl)
                .build(),
            reverse: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    /// Create a normalizer using the timeout and cache TTL from config.
    #[must_use]
    pub fn from_config(geocoder: G, config: &GeocoderConfig) -> Self {
        Self::new(geocoder, config.timeout, config.cache_ttl)
    }

    /// Geocode a free-form address.
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Validation` for a blank address and
    /// `LocationError::GeocodeFailure` when nothing usable comes back in time.
    #[instrument(skip(self))]
    pub async fn geocode(&self, address: &str) -> Result<GeocodedAddress, LocationError> {
        let key = address.trim().to_lowercase();
        if key.is_empty() {
            return Err(LocationError::Validation("address is empty".to_string()));
        }
        if let Some(hit) = self.forward.get(&key).await {
            return Ok(hit);
        }

        let found = match tokio::time::timeout(self.timeout, self.geocoder.geocode(address.trim()))
            .await
        {
            Err(_) => return Err(timed_out(self.timeout)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Geocoder request failed");
                return Err(LocationError::GeocodeFailure(e.to_string()));
            }
            Ok(Ok(None)) => {
                return Err(LocationError::GeocodeFailure(
                    "no match for address".to_string(),
                ));
            }
            Ok(Ok(Some(found))) => found,
        };

        self.forward.insert(key, found.clone()).await;
        Ok(found)
    }

    /// Find a display address for a coordinate.
    ///
    /// # Errors
    ///
    /// Returns `LocationError::GeocodeFailure` when nothing usable comes back
    /// in time.
    #[instrument(skip(self))]
    pub async fn reverse_geocode(&self, point: Coordinate) -> Result<String, LocationError> {
        let key = coordinate_key(point);
        if let Some(hit) = self.reverse.get(&key).await {
            return Ok(hit);
        }

        let found =
            match tokio::time::timeout(self.timeout, self.geocoder.reverse_geocode(point)).await {
                Err(_) => return Err(timed_out(self.timeout)),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Reverse geocoder request failed");
                    return Err(LocationError::GeocodeFailure(e.to_string()));
                }
                Ok(Ok(None)) => {
                    return Err(LocationError::GeocodeFailure(
                        "no address at coordinate".to_string(),
                    ));
                }
                Ok(Ok(Some(found))) => found,
            };

        self.reverse.insert(key, found.clone()).await;
        Ok(found)
    }

    /// Normalize shopper input into a coordinate and display address.
    ///
    /// A supplied coordinate wins over a supplied address. The coordinate is
    /// reverse geocoded for display; if that fails, the supplied address text
    /// is kept instead.
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Validation` if neither a coordinate nor an
    /// address is given, and `LocationError::GeocodeFailure` if an address
    /// alone cannot be geocoded.
    #[instrument(skip_all)]
    pub async fn normalize(&self, input: &LocationInput) -> Result<ResolvedLocation, LocationError> {
        let address = input.address();

        if let Some(coordinate) = input.coordinate()? {
            let display = match self.reverse_geocode(coordinate).await {
                Ok(display) => Some(display),
                Err(e) => {
                    tracing::debug!(error = %e, "Keeping supplied address");
                    address.map(AddressFragments::joined)
                }
            };
            return Ok(ResolvedLocation {
                coordinate,
                address: display,
            });
        }

        let Some(address) = address else {
            return Err(LocationError::Validation(
                "a coordinate or an address is required".to_string(),
            ));
        };

        let found = self.geocode(&address.joined()).await?;
        Ok(ResolvedLocation {
            coordinate: found.coordinate,
            address: Some(found.normalized_address),
        })
    }
}

fn timed_out(timeout: Duration) -> LocationError {
    tracing::warn!(timeout = ?timeout, "Geocoder timed out");
    LocationError::GeocodeFailure(format!("no answer within {}ms", timeout.as_millis()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::geocoding::GeocoderError;

    #[derive(Default)]
    struct FakeGeocoder {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocoderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(GeocoderError::Parse("boom".to_string()));
            }
            if address.contains("nowhere") {
                return Ok(None);
            }
            Ok(Some(GeocodedAddress {
                coordinate: Coordinate::new(5.0, 5.0).unwrap(),
                normalized_address: format!("{address} (normalized)"),
            }))
        }

        async fn reverse_geocode(&self, point: Coordinate) -> Result<Option<String>, GeocoderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeocoderError::Parse("boom".to_string()));
            }
            Ok(Some(format!("{:.1},{:.1}", point.lat, point.lng)))
        }
    }

    fn normalizer(geocoder: FakeGeocoder) -> LocationNormalizer<FakeGeocoder> {
        LocationNormalizer::new(geocoder, Duration::from_millis(50), Duration::from_secs(60))
    }

    fn address(line1: &str) -> AddressFragments {
        AddressFragments {
            line1: Some(line1.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_geocode_caches_hits() {
        let normalizer = normalizer(FakeGeocoder::default());
        let first = normalizer.geocode("1 Main St").await.unwrap();
        let second = normalizer.geocode("  1 main st ").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(normalizer.geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_geocode_no_result_is_failure() {
        let normalizer = normalizer(FakeGeocoder::default());
        let err = normalizer.geocode("nowhere at all").await.unwrap_err();
        assert!(matches!(err, LocationError::GeocodeFailure(_)));
    }

    #[tokio::test]
    async fn test_geocode_blank_is_validation_error() {
        let normalizer = normalizer(FakeGeocoder::default());
        let err = normalizer.geocode("   ").await.unwrap_err();
        assert!(matches!(err, LocationError::Validation(_)));
        assert_eq!(normalizer.geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_geocode_timeout_is_failure() {
        let normalizer = normalizer(FakeGeocoder {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let err = normalizer.geocode("1 Main St").await.unwrap_err();
        assert!(matches!(err, LocationError::GeocodeFailure(_)));
    }

    #[tokio::test]
    async fn test_geocode_collaborator_error_is_failure() {
        let normalizer = normalizer(FakeGeocoder {
            fail: true,
            ..Default::default()
        });
        assert!(matches!(
            normalizer.geocode("1 Main St").await,
            Err(LocationError::GeocodeFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_normalize_prefers_coordinate() {
        let normalizer = normalizer(FakeGeocoder::default());
        let input = LocationInput {
            latitude: Some(1.0),
            longitude: Some(2.0),
            address: Some(address("1 Main St")),
        };
        let resolved = normalizer.normalize(&input).await.unwrap();
        assert_eq!(resolved.coordinate, Coordinate::new(1.0, 2.0).unwrap());
        assert_eq!(resolved.address.as_deref(), Some("1.0,2.0"));
    }

    #[tokio::test]
    async fn test_normalize_keeps_supplied_address_when_reverse_fails() {
        let normalizer = normalizer(FakeGeocoder {
            fail: true,
            ..Default::default()
        });
        let input = LocationInput {
            latitude: Some(1.0),
            longitude: Some(2.0),
            address: Some(address("1 Main St")),
        };
        let resolved = normalizer.normalize(&input).await.unwrap();
        assert_eq!(resolved.address.as_deref(), Some("1 Main St"));
    }

    #[tokio::test]
    async fn test_normalize_geocodes_address_only() {
        let normalizer = normalizer(FakeGeocoder::default());
        let input = LocationInput {
            address: Some(address("1 Main St")),
            ..Default::default()
        };
        let resolved = normalizer.normalize(&input).await.unwrap();
        assert_eq!(resolved.coordinate, Coordinate::new(5.0, 5.0).unwrap());
        assert_eq!(resolved.address.as_deref(), Some("1 Main St (normalized)"));
    }

    #[tokio::test]
    async fn test_normalize_rejects_empty_input() {
        let normalizer = normalizer(FakeGeocoder::default());
        let err = normalizer.normalize(&LocationInput::default()).await.unwrap_err();
        assert!(matches!(err, LocationError::Validation(_)));

        let blank = LocationInput {
            address: Some(AddressFragments::default()),
            ..Default::default()
        };
        assert!(matches!(
            normalizer.normalize(&blank).await,
            Err(LocationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_normalize_rejects_half_coordinate_and_out_of_range() {
        let normalizer = normalizer(FakeGeocoder::default());
        let half = LocationInput {
            latitude: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            normalizer.normalize(&half).await,
            Err(LocationError::Validation(_))
        ));

        let out_of_range = LocationInput {
            latitude: Some(91.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            normalizer.normalize(&out_of_range).await,
            Err(LocationError::Validation(_))
        ));
    }
}
