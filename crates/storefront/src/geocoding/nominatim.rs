//! Nominatim-compatible HTTP geocoder.
//!
//! Uses `/search` and `/reverse` with `format=jsonv2`. Hosted providers that
//! speak the same protocol take an API key as the `key` query parameter.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use geomarket_core::Coordinate;

use super::{GeocodedAddress, Geocoder, GeocoderError};
use crate::config::GeocoderConfig;

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: String,
}

/// `/reverse` answers 200 with an `error` object when nothing is found.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReverseResponse {
    Place(Place),
    Miss { error: String },
}

impl Place {
    fn into_geocoded(self) -> Result<GeocodedAddress, GeocoderError> {
        let lat = self
            .lat
            .parse::<f64>()
            .map_err(|e| GeocoderError::Parse(format!("lat {:?}: {e}", self.lat)))?;
        let lng = self
            .lon
            .parse::<f64>()
            .map_err(|e| GeocoderError::Parse(format!("lon {:?}: {e}", self.lon)))?;
        let coordinate =
            Coordinate::new(lat, lng).map_err(|e| GeocoderError::Parse(e.to_string()))?;

        Ok(GeocodedAddress {
            coordinate,
            normalized_address: self.display_name,
        })
    }
}

/// HTTP client for a Nominatim-compatible geocoding API.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl NominatimGeocoder {
    /// Create a new geocoder client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocoderError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, GeocoderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GeocoderError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(path);
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(params);
            query.append_pair("format", "jsonv2");
            if let Some(key) = &self.api_key {
                query.append_pair("key", key.expose_secret());
            }
        }
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String, GeocoderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocoderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }
}

impl Geocoder for NominatimGeocoder {
    #[tracing::instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocoderError> {
        let url = self.endpoint("search", &[("q", address), ("limit", "1")])?;
        let body = self.get_text(url).await?;
        parse_search(&body)
    }

    #[tracing::instrument(skip(self))]
    async fn reverse_geocode(&self, point: Coordinate) -> Result<Option<String>, GeocoderError> {
        let lat = point.lat.to_string();
        let lng = point.lng.to_string();
        let url = self.endpoint("reverse", &[("lat", &lat), ("lon", &lng)])?;
        let body = self.get_text(url).await?;
        parse_reverse(&body)
    }
}

fn parse_search(body: &str) -> Result<Option<GeocodedAddress>, GeocoderError> {
    let places: Vec<Place> =
        serde_json::from_str(body).map_err(|e| GeocoderError::Parse(e.to_string()))?;
    places.into_iter().next().map(Place::into_geocoded).transpose()
}

fn parse_reverse(body: &str) -> Result<Option<String>, GeocoderError> {
    match serde_json::from_str(body).map_err(|e| GeocoderError::Parse(e.to_string()))? {
        ReverseResponse::Place(place) => Ok(Some(place.display_name)),
        ReverseResponse::Miss { error } => {
            tracing::debug!(%error, "Reverse geocode miss");
            Ok(None)
        }
    }
}
