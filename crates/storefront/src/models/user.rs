//! Shopper profile model.

use serde::Serialize;

use geomarket_core::{Coordinate, UserId, ZoneId};

/// A shopper's saved delivery location and zone.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub address: Option<String>,
    pub location: Option<Coordinate>,
    pub zone_id: Option<ZoneId>,
}
