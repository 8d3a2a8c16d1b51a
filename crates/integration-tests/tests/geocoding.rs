//! Nominatim client and location normalizer against a local fake geocoder.
//!
//! The fake speaks just enough of the Nominatim `/search` and `/reverse`
//! protocol; no network access or database is needed.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use geomarket_storefront::config::GeocoderConfig;
use geomarket_storefront::geocoding::{AddressFragments, Geocoder, NominatimGeocoder};
use geomarket_storefront::services::{LocationError, LocationInput, LocationNormalizer};
use serde_json::{Value, json};
use url::Url;

#[derive(Clone, Default)]
struct Calls(Arc<AtomicUsize>);

impl Calls {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn search(State(calls): State<Calls>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    calls.0.fetch_add(1, Ordering::SeqCst);
    assert_eq!(q.get("format").map(String::as_str), Some("jsonv2"));
    let query = q.get("q").cloned().unwrap_or_default();
    if query.contains("Rivoli") {
        Json(json!([{
            "lat": "48.8606",
            "lon": "2.3376",
            "display_name": "10 Rue de Rivoli, 75001 Paris, France"
        }]))
    } else {
        Json(json!([]))
    }
}

async fn reverse(State(calls): State<Calls>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    calls.0.fetch_add(1, Ordering::SeqCst);
    let lat: f64 = q.get("lat").and_then(|v| v.parse().ok()).unwrap_or_default();
    if lat > 40.0 {
        Json(json!({
            "lat": q.get("lat"),
            "lon": q.get("lon"),
            "display_name": "Musée du Louvre, Paris, France"
        }))
    } else {
        Json(json!({ "error": "Unable to geocode" }))
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!([]))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream down")
}

/// Serve the fake on an ephemeral port.
async fn fake_geocoder() -> (SocketAddr, Calls) {
    let calls = Calls::default();
    let app = Router::new()
        .route("/search", get(search))
        .route("/reverse", get(reverse))
        .route("/slow/search", get(slow))
        .route("/slow/reverse", get(slow))
        .route("/broken/search", get(broken))
        .route("/broken/reverse", get(broken))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, calls)
}

fn config(addr: SocketAddr, path: &str) -> GeocoderConfig {
    GeocoderConfig {
        base_url: Url::parse(&format!("http://{addr}{path}")).unwrap(),
        api_key: None,
        user_agent: "geomarket-integration-tests".to_string(),
        timeout: Duration::from_secs(10),
        cache_ttl: Duration::from_secs(60),
    }
}

fn normalizer(config: &GeocoderConfig, timeout: Duration) -> LocationNormalizer<NominatimGeocoder> {
    LocationNormalizer::new(
        NominatimGeocoder::new(config).unwrap(),
        timeout,
        config.cache_ttl,
    )
}

fn rivoli() -> AddressFragments {
    AddressFragments {
        line1: Some("10 Rue de Rivoli".to_string()),
        city: Some("Paris".to_string()),
        ..AddressFragments::default()
    }
}

// =============================================================================
// Nominatim client
// =============================================================================

#[tokio::test]
async fn test_client_geocode_hit_and_miss() {
    let (addr, _) = fake_geocoder().await;
    let geocoder = NominatimGeocoder::new(&config(addr, "/")).unwrap();

    let hit = geocoder.geocode("10 Rue de Rivoli, Paris").await.unwrap().unwrap();
    assert!((hit.coordinate.lat - 48.8606).abs() < 1e-9);
    assert_eq!(hit.normalized_address, "10 Rue de Rivoli, 75001 Paris, France");

    assert!(geocoder.geocode("Nowhere at all").await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_reverse_miss_is_none() {
    let (addr, _) = fake_geocoder().await;
    let geocoder = NominatimGeocoder::new(&config(addr, "/")).unwrap();

    let point = geomarket_integration_tests::coord(0.5, 0.5);
    assert!(geocoder.reverse_geocode(point).await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_http_error_is_reported() {
    let (addr, _) = fake_geocoder().await;
    let geocoder = NominatimGeocoder::new(&config(addr, "/broken/")).unwrap();

    let err = geocoder.geocode("10 Rue de Rivoli").await.unwrap_err();
    assert!(err.to_string().contains("503"), "{err}");
}

// =============================================================================
// Normalizer
// =============================================================================

#[tokio::test]
async fn test_address_is_geocoded_once_then_cached() {
    let (addr, calls) = fake_geocoder().await;
    let normalizer = normalizer(&config(addr, "/"), Duration::from_secs(5));
    let input = LocationInput {
        address: Some(rivoli()),
        ..LocationInput::default()
    };

    let first = normalizer.normalize(&input).await.unwrap();
    let second = normalizer.normalize(&input).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.address.as_deref(),
        Some("10 Rue de Rivoli, 75001 Paris, France")
    );
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn test_coordinate_wins_and_is_reverse_geocoded() {
    let (addr, _) = fake_geocoder().await;
    let normalizer = normalizer(&config(addr, "/"), Duration::from_secs(5));
    let input = LocationInput {
        latitude: Some(48.8611),
        longitude: Some(2.3364),
        address: Some(rivoli()),
    };

    let resolved = normalizer.normalize(&input).await.unwrap();
    assert!((resolved.coordinate.lat - 48.8611).abs() < 1e-9);
    assert_eq!(
        resolved.address.as_deref(),
        Some("Musée du Louvre, Paris, France")
    );
}

#[tokio::test]
async fn test_unknown_address_is_geocode_failure() {
    let (addr, _) = fake_geocoder().await;
    let normalizer = normalizer(&config(addr, "/"), Duration::from_secs(5));
    let input = LocationInput {
        address: Some(AddressFragments {
            line1: Some("Nowhere at all".to_string()),
            ..AddressFragments::default()
        }),
        ..LocationInput::default()
    };

    assert!(matches!(
        normalizer.normalize(&input).await,
        Err(LocationError::GeocodeFailure(_))
    ));
}

#[tokio::test]
async fn test_slow_geocoder_times_out() {
    let (addr, _) = fake_geocoder().await;
    let normalizer = normalizer(&config(addr, "/slow/"), Duration::from_millis(100));
    let input = LocationInput {
        address: Some(rivoli()),
        ..LocationInput::default()
    };

    assert!(matches!(
        normalizer.normalize(&input).await,
        Err(LocationError::GeocodeFailure(_))
    ));
}

#[tokio::test]
async fn test_missing_input_is_validation_error() {
    let (addr, calls) = fake_geocoder().await;
    let normalizer = normalizer(&config(addr, "/"), Duration::from_secs(5));

    assert!(matches!(
        normalizer.normalize(&LocationInput::default()).await,
        Err(LocationError::Validation(_))
    ));
    assert_eq!(calls.count(), 0);
}
