//! Seed the database with stores, products, offers and zones from YAML.
//!
//! ```yaml
//! products:
//!   - Espresso beans
//! stores:
//!   - name: Bean Co
//!     location: { lat: 48.857, lng: 2.352 }
//!     offers:
//!       - { product: Espresso beans, price: "12.50", stock: 40 }
//! zones:
//!   - name: Downtown
//!     translations: { fr: Centre-ville }
//!     polygon: [{ lat: 48.85, lng: 2.34 }, { lat: 48.86, lng: 2.34 }, { lat: 48.86, lng: 2.36 }]
//!     stores: [Bean Co]
//! ```
//!
//! Zones are created through the same path as the operator API, so each one
//! is swept as it is created.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use geomarket_core::{Coordinate, ProductId, StoreId};
use geomarket_storefront::db::stores;
use geomarket_storefront::services::ZoneMembershipSynchronizer;
use geomarket_storefront::services::zones::{ZoneAdmin, ZoneDraft};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub stores: Vec<SeedStore>,
    #[serde(default)]
    pub zones: Vec<SeedZone>,
}

#[derive(Debug, Deserialize)]
pub struct SeedStore {
    pub name: String,
    pub location: Coordinate,
    #[serde(default)]
    pub offers: Vec<SeedOffer>,
}

#[derive(Debug, Deserialize)]
pub struct SeedOffer {
    pub product: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct SeedZone {
    #[serde(flatten)]
    pub draft: ZoneDraft,
    /// Store names on the roster.
    #[serde(default)]
    pub stores: Vec<String>,
}

/// Problems that would make the seed fail halfway.
#[must_use]
pub fn validate(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();

    let products: HashSet<&str> = seed.products.iter().map(String::as_str).collect();
    if products.len() != seed.products.len() {
        errors.push("duplicate product names".to_string());
    }
    let stores: HashSet<&str> = seed.stores.iter().map(|s| s.name.as_str()).collect();
    if stores.len() != seed.stores.len() {
        errors.push("duplicate store names".to_string());
    }

    for store in &seed.stores {
        if Coordinate::new(store.location.lat, store.location.lng).is_err() {
            errors.push(format!("store '{}' has an invalid location", store.name));
        }
        for offer in &store.offers {
            if !products.contains(offer.product.as_str()) {
                errors.push(format!(
                    "store '{}' offers unknown product '{}'",
                    store.name, offer.product
                ));
            }
            if offer.price.is_sign_negative() || offer.stock < 0 {
                errors.push(format!(
                    "store '{}' offer for '{}' has a negative price or stock",
                    store.name, offer.product
                ));
            }
        }
    }

    for zone in &seed.zones {
        for name in &zone.stores {
            if !stores.contains(name.as_str()) {
                errors.push(format!(
                    "zone '{}' lists unknown store '{name}'",
                    zone.draft.name
                ));
            }
        }
    }

    errors
}

/// Seed from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid, or a database
/// operation fails.
pub async fn from_file(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading seed file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;

    let mut product_ids: HashMap<&str, ProductId> = HashMap::new();
    for name in &seed.products {
        product_ids.insert(name.as_str(), stores::create_product(&pool, name).await?);
    }

    let mut store_ids: HashMap<&str, StoreId> = HashMap::new();
    for store in &seed.stores {
        let created = stores::create_store(&pool, &store.name, store.location).await?;
        for offer in &store.offers {
            let product_id = product_ids
                .get(offer.product.as_str())
                .copied()
                .ok_or_else(|| format!("unknown product '{}'", offer.product))?;
            stores::upsert_offer(&pool, created.id, product_id, offer.price, offer.stock).await?;
        }
        store_ids.insert(store.name.as_str(), created.id);
    }
    info!(
        products = product_ids.len(),
        stores = store_ids.len(),
        "Catalog seeded"
    );

    let synchronizer = ZoneMembershipSynchronizer::new(pool.clone());
    let admin = ZoneAdmin::new(&pool, &synchronizer);
    for zone in seed.zones {
        let roster: Vec<StoreId> = zone
            .stores
            .iter()
            .filter_map(|name| store_ids.get(name.as_str()).copied())
            .collect();
        let edit = admin.create(zone.draft).await?;
        admin.replace_roster(edit.zone.id, roster).await?;
        info!(zone_id = %edit.zone.id, name = %edit.zone.name, "Zone seeded");
    }

    Ok(())
}
