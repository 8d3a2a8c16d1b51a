//! Zone resolution.
//!
//! Zone polygons are not required to be disjoint. When several zones contain
//! a point, the zone with the smallest polygon area wins, and equal areas fall
//! back to the lowest zone id. The result therefore never depends on the order
//! in which zones were loaded.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::geo::{Coordinate, Polygon};
use crate::types::{StoreId, ZoneId};

/// The set of stores permitted to sell into a zone, in store id order.
pub type Roster = BTreeSet<StoreId>;

/// Anything with a zone identity and a delivery polygon.
pub trait Coverage {
    /// The zone's ID.
    fn zone_id(&self) -> ZoneId;

    /// The zone's delivery polygon.
    fn polygon(&self) -> &Polygon;

    /// Whether this zone covers `point`.
    fn covers(&self, point: &Coordinate) -> bool {
        self.polygon().contains(point)
    }
}

/// Find the zone that governs `point`, if any.
///
/// Zones with fewer than three vertices are skipped.
#[must_use]
pub fn resolve<'a, Z: Coverage>(point: &Coordinate, zones: &'a [Z]) -> Option<&'a Z> {
    zones
        .iter()
        .filter(|zone| zone.polygon().is_valid() && zone.covers(point))
        .min_by(|a, b| precedence(*a, *b))
}

/// Resolve an optional coordinate to a zone ID. No coordinate, no zone.
#[must_use]
pub fn resolve_id<Z: Coverage>(point: Option<&Coordinate>, zones: &[Z]) -> Option<ZoneId> {
    point
        .and_then(|point| resolve(point, zones))
        .map(Coverage::zone_id)
}

fn precedence<Z: Coverage>(a: &Z, b: &Z) -> Ordering {
    a.polygon()
        .area()
        .total_cmp(&b.polygon().area())
        .then_with(|| a.zone_id().cmp(&b.zone_id()))
}

/// A bare zone shape, for callers that have no richer zone type at hand.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneShape {
    pub id: ZoneId,
    pub polygon: Polygon,
}

impl Coverage for ZoneShape {
    fn zone_id(&self) -> ZoneId {
        self.id
    }

    fn polygon(&self) -> &Polygon {
        &self.polygon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lng: f64) -> Coordinate {
        Coordinate { lat, lng }
    }

    fn rect(id: i32, lat0: f64, lng0: f64, lat1: f64, lng1: f64) -> ZoneShape {
        ZoneShape {
            id: ZoneId::new(id),
            polygon: Polygon::new(vec![
                pt(lat0, lng0),
                pt(lat0, lng1),
                pt(lat1, lng1),
                pt(lat1, lng0),
            ]),
        }
    }

    #[test]
    fn test_resolve_single_zone() {
        let zones = vec![rect(1, 0.0, 0.0, 10.0, 10.0)];
        assert_eq!(
            resolve(&pt(5.0, 5.0), &zones).map(Coverage::zone_id),
            Some(ZoneId::new(1))
        );
        assert!(resolve(&pt(20.0, 20.0), &zones).is_none());
    }

    #[test]
    fn test_resolve_prefers_smallest_area() {
        let zones = vec![rect(1, 0.0, 0.0, 10.0, 10.0), rect(2, 4.0, 4.0, 6.0, 6.0)];
        assert_eq!(resolve_id(Some(&pt(5.0, 5.0)), &zones), Some(ZoneId::new(2)));

        let reversed: Vec<_> = zones.into_iter().rev().collect();
        assert_eq!(
            resolve_id(Some(&pt(5.0, 5.0)), &reversed),
            Some(ZoneId::new(2))
        );
    }

    #[test]
    fn test_resolve_equal_area_prefers_lowest_id() {
        let zones = vec![rect(9, 0.0, 0.0, 10.0, 10.0), rect(3, 0.0, 0.0, 10.0, 10.0)];
        assert_eq!(resolve_id(Some(&pt(5.0, 5.0)), &zones), Some(ZoneId::new(3)));
    }

    #[test]
    fn test_resolve_skips_invalid_polygons() {
        let zones = vec![
            ZoneShape {
                id: ZoneId::new(1),
                polygon: Polygon::new(vec![pt(0.0, 0.0), pt(10.0, 10.0)]),
            },
            rect(2, 0.0, 0.0, 10.0, 10.0),
        ];
        assert_eq!(resolve_id(Some(&pt(5.0, 5.0)), &zones), Some(ZoneId::new(2)));
    }

    #[test]
    fn test_resolve_without_coordinate() {
        let zones = vec![rect(1, 0.0, 0.0, 10.0, 10.0)];
        assert_eq!(resolve_id(None, &zones), None);
    }

    #[test]
    fn test_roster_iterates_in_store_order() {
        let roster: Roster = [StoreId::new(7), StoreId::new(2), StoreId::new(5), StoreId::new(2)]
            .into_iter()
            .collect();
        let ids: Vec<i32> = roster.iter().map(|id| id.as_i32()).collect();
        assert_eq!(ids, vec![2, 5, 7]);
    }
}
