//! Coordinates, polygons and the point-in-polygon test.
//!
//! Polygons are ordered vertex lists in (latitude, longitude). The last vertex
//! implicitly connects back to the first. Fewer than three vertices describe no
//! area, so such a polygon never contains any point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum vertex count for a polygon to cover any area.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Errors constructing a [`Coordinate`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinate {
    /// Create a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns `CoordinateError` if either component is non-finite or out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Build a coordinate from nullable database columns.
    ///
    /// Returns `None` unless both columns are present and valid.
    #[must_use]
    pub fn from_columns(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).ok(),
            _ => None,
        }
    }
}

/// An ordered vertex list describing a simple polygon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(Vec<Coordinate>);

impl Polygon {
    /// Create a polygon from its vertices, in drawing order.
    #[must_use]
    pub const fn new(vertices: Vec<Coordinate>) -> Self {
        Self(vertices)
    }

    /// The vertices in drawing order.
    #[must_use]
    pub fn vertices(&self) -> &[Coordinate] {
        &self.0
    }

    /// Whether the polygon has enough vertices to cover any area.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.len() >= MIN_POLYGON_VERTICES
    }

    /// Whether `point` lies inside this polygon. See [`contains`].
    #[must_use]
    pub fn contains(&self, point: &Coordinate) -> bool {
        contains(point, &self.0)
    }

    /// Unsigned planar area in square degrees (shoelace formula).
    ///
    /// Only meaningful for comparing polygons against each other. Invalid
    /// polygons have zero area.
    #[must_use]
    pub fn area(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let twice: f64 = edges(&self.0)
            .map(|(prev, cur)| prev.lng.mul_add(cur.lat, -(cur.lng * prev.lat)))
            .sum();
        (twice / 2.0).abs()
    }

    /// Axis-aligned bounding box of the vertices, if the polygon is valid.
    ///
    /// A point outside the box is outside the polygon, so the box can narrow
    /// a database scan before the exact test runs.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        if !self.is_valid() {
            return None;
        }
        let start = Bounds {
            min_lat: f64::INFINITY,
            min_lng: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        Some(self.0.iter().fold(start, |b, v| Bounds {
            min_lat: b.min_lat.min(v.lat),
            min_lng: b.min_lng.min(v.lng),
            max_lat: b.max_lat.max(v.lat),
            max_lng: b.max_lng.max(v.lng),
        }))
    }
}

/// Inclusive latitude/longitude ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Whether `point` lies within the box, edges included.
    #[must_use]
    pub fn contains(&self, point: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

impl From<Vec<Coordinate>> for Polygon {
    fn from(vertices: Vec<Coordinate>) -> Self {
        Self(vertices)
    }
}

/// Ray-casting (crossing-number) point-in-polygon test.
///
/// Casts a ray from `point` towards increasing longitude and counts edge
/// crossings; an odd count means inside. Each edge is evaluated as
/// (previous vertex, current vertex), so rotating the starting vertex leaves
/// every edge computation, and therefore the result, unchanged. Points on an
/// edge or vertex get whatever the arithmetic yields, which is the same on
/// every call.
#[must_use]
pub fn contains(point: &Coordinate, polygon: &[Coordinate]) -> bool {
    if polygon.len() < MIN_POLYGON_VERTICES {
        return false;
    }

    edges(polygon).fold(false, |inside, (prev, cur)| {
        let straddles = (cur.lat > point.lat) != (prev.lat > point.lat);
        if straddles {
            let crossing_lng =
                (prev.lng - cur.lng) * (point.lat - cur.lat) / (prev.lat - cur.lat) + cur.lng;
            if point.lng < crossing_lng {
                return !inside;
            }
        }
        inside
    })
}

/// Iterate (previous, current) vertex pairs, closing the ring.
fn edges(polygon: &[Coordinate]) -> impl Iterator<Item = (&Coordinate, &Coordinate)> {
    let previous = polygon.iter().cycle().skip(polygon.len().saturating_sub(1));
    previous.zip(polygon.iter())
}
