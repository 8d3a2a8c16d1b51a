//! Geocoding collaborator.
//!
//! The [`Geocoder`] trait is the seam between the location service and the
//! outside world. [`NominatimGeocoder`] talks to a Nominatim-compatible HTTP
//! API; tests substitute in-process fakes.

mod nominatim;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use geomarket_core::Coordinate;

pub use nominatim::NominatimGeocoder;

/// Errors that can occur when talking to the geocoding API.
#[derive(Debug, Error)]
pub enum GeocoderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to build the request URL.
    #[error("invalid URL: {0}")]
    Url(String),

    /// Failed to parse the response.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodedAddress {
    pub coordinate: Coordinate,
    /// The collaborator's canonical rendering of the address.
    pub normalized_address: String,
}

/// Free-form address pieces as a shopper typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFragments {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl AddressFragments {
    fn parts(&self) -> impl Iterator<Item = &str> {
        [
            &self.line1,
            &self.line2,
            &self.city,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref().map(str::trim))
        .filter(|part| !part.is_empty())
    }

    /// Whether every fragment is missing or blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts().next().is_none()
    }

    /// Non-blank fragments joined into one query line.
    #[must_use]
    pub fn joined(&self) -> String {
        self.parts().collect::<Vec<_>>().join(", ")
    }
}

/// Forward and reverse geocoding.
///
/// `Ok(None)` means the collaborator answered but found nothing.
pub trait Geocoder: Send + Sync {
    /// Look up a coordinate for a free-form address.
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<GeocodedAddress>, GeocoderError>> + Send;

    /// Look up a display address for a coordinate.
    fn reverse_geocode(
        &self,
        point: Coordinate,
    ) -> impl Future<Output = Result<Option<String>, GeocoderError>> + Send;
}
