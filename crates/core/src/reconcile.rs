//! Zone reconciliation planning.
//!
//! Everything here decides *what* should change; the storefront applies the
//! decisions inside database transactions. Keeping the decisions pure means a
//! sweep, a location change and a checkout all reach the same verdict for the
//! same inputs.

use crate::geo::Coordinate;
use crate::types::{CartId, CartItemId, StoreId, UserId, ZoneId};
use crate::zoning::{Coverage, Roster, resolve_id};

/// A user or cart as seen by a sweep: current zone and saved coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member<Id> {
    pub id: Id,
    pub zone_id: Option<ZoneId>,
    pub coordinate: Option<Coordinate>,
}

impl<Id> Member<Id> {
    /// The zone this member belongs to under the current zone set.
    #[must_use]
    pub fn resolved_zone<Z: Coverage>(&self, zones: &[Z]) -> Option<ZoneId> {
        resolve_id(self.coordinate.as_ref(), zones)
    }

    /// Whether a sweep of `zone` must look at this member.
    ///
    /// Members already assigned to the zone may have to leave it; members
    /// whose coordinate falls inside it may have to join it.
    #[must_use]
    pub fn is_candidate<Z: Coverage>(&self, zone: &Z) -> bool {
        self.zone_id == Some(zone.zone_id())
            || self
                .coordinate
                .as_ref()
                .is_some_and(|point| zone.polygon().is_valid() && zone.covers(point))
    }
}

/// A zone change for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassignment<Id> {
    pub id: Id,
    pub from: Option<ZoneId>,
    pub to: Option<ZoneId>,
}

impl<Id> Reassignment<Id> {
    /// Whether the member's zone actually changes.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// The in-memory result of planning a sweep for one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Users whose zone changes.
    pub users: Vec<Reassignment<UserId>>,
    /// Every candidate cart, changed or not. Carts that keep the zone still
    /// need pruning against a roster that may have shrunk.
    pub carts: Vec<Reassignment<CartId>>,
}

impl SweepPlan {
    /// Number of carts whose zone changes.
    #[must_use]
    pub fn cart_changes(&self) -> usize {
        self.carts.iter().filter(|cart| cart.is_change()).count()
    }
}

/// Plan a sweep after `target`'s polygon or roster changed.
///
/// `zones` is the full current zone set; `target` is looked up in it. If the
/// target is missing (deleted) only members still pointing at it are
/// considered. Each candidate is re-resolved against every zone, so a member
/// that leaves the target lands in whichever zone now governs it, or none.
#[must_use]
pub fn plan_sweep<Z: Coverage>(
    target: ZoneId,
    zones: &[Z],
    users: &[Member<UserId>],
    carts: &[Member<CartId>],
) -> SweepPlan {
    let zone = zones.iter().find(|zone| zone.zone_id() == target);
    let is_candidate = |zone_id: Option<ZoneId>, coordinate: Option<&Coordinate>| match zone {
        Some(zone) => Member {
            id: (),
            zone_id,
            coordinate: coordinate.copied(),
        }
        .is_candidate(zone),
        None => zone_id == Some(target),
    };

    let users = users
        .iter()
        .filter(|user| is_candidate(user.zone_id, user.coordinate.as_ref()))
        .map(|user| Reassignment {
            id: user.id,
            from: user.zone_id,
            to: user.resolved_zone(zones),
        })
        .filter(Reassignment::is_change)
        .collect();

    let carts = carts
        .iter()
        .filter(|cart| is_candidate(cart.zone_id, cart.coordinate.as_ref()))
        .map(|cart| Reassignment {
            id: cart.id,
            from: cart.zone_id,
            to: cart.resolved_zone(zones),
        })
        .collect();

    SweepPlan { users, carts }
}

/// A cart item reduced to what zone validation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPlacement {
    pub id: CartItemId,
    pub store_id: StoreId,
}

/// Items that cannot be delivered under a zone with `roster`.
///
/// `None` means the cart has no zone, in which case nothing is deliverable.
#[must_use]
pub fn items_outside_roster(items: &[ItemPlacement], roster: Option<&Roster>) -> Vec<CartItemId> {
    items
        .iter()
        .filter(|item| roster.is_none_or(|roster| !roster.contains(&item.store_id)))
        .map(|item| item.id)
        .collect()
}

/// Why a checkout was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The cart has no zone.
    NoZone,
    /// The cart's zone has no stores.
    EmptyRoster,
    /// Some items come from stores outside the zone.
    ItemsOutsideZone,
}

impl RejectReason {
    /// Short machine-readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoZone => "no_zone",
            Self::EmptyRoster => "empty_roster",
            Self::ItemsOutsideZone => "items_outside_zone",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checkout-time validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutVerdict {
    /// Every item is deliverable; the order may be created.
    Proceed,
    /// Checkout must abort after removing `removed`.
    Reject {
        reason: RejectReason,
        removed: Vec<CartItemId>,
    },
}

/// Re-validate a cart's items against its zone's current roster.
#[must_use]
pub fn verify_checkout(
    zone_id: Option<ZoneId>,
    roster: &Roster,
    items: &[ItemPlacement],
) -> CheckoutVerdict {
    let (reason, removed) = match zone_id {
        None => (RejectReason::NoZone, items_outside_roster(items, None)),
        Some(_) if roster.is_empty() => {
            (RejectReason::EmptyRoster, items_outside_roster(items, None))
        }
        Some(_) => (
            RejectReason::ItemsOutsideZone,
            items_outside_roster(items, Some(roster)),
        ),
    };

    if removed.is_empty() && reason == RejectReason::ItemsOutsideZone {
        CheckoutVerdict::Proceed
    } else {
        CheckoutVerdict::Reject { reason, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Polygon;
    use crate::zoning::ZoneShape;

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

    fn user(id: i32, zone: Option<i32>, at: Option<(f64, f64)>) -> Member<UserId> {
        Member {
            id: UserId::new(id),
            zone_id: zone.map(ZoneId::new),
            coordinate: at.map(|(lat, lng)| pt(lat, lng)),
        }
    }

    fn cart(id: i32, zone: Option<i32>, at: Option<(f64, f64)>) -> Member<CartId> {
        Member {
            id: CartId::new(id),
            zone_id: zone.map(ZoneId::new),
            coordinate: at.map(|(lat, lng)| pt(lat, lng)),
        }
    }

    fn item(id: i32, store: i32) -> ItemPlacement {
        ItemPlacement {
            id: CartItemId::new(id),
            store_id: StoreId::new(store),
        }
    }

    #[test]
    fn test_sweep_clears_user_that_left_zone() {
        // Zone 1 shrank; the user at (8, 8) is now outside it.
        let zones = vec![rect(1, 0.0, 0.0, 5.0, 5.0)];
        let users = vec![user(1, Some(1), Some((8.0, 8.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &users, &[]);
        assert_eq!(
            plan.users,
            vec![Reassignment {
                id: UserId::new(1),
                from: Some(ZoneId::new(1)),
                to: None
            }]
        );
    }

    #[test]
    fn test_sweep_leaves_unrelated_user_untouched() {
        let zones = vec![rect(1, 0.0, 0.0, 5.0, 5.0), rect(2, 20.0, 20.0, 30.0, 30.0)];
        let users = vec![
            user(1, Some(2), Some((25.0, 25.0))),
            user(2, None, Some((8.0, 8.0))),
            user(3, None, None),
        ];
        let plan = plan_sweep(ZoneId::new(1), &zones, &users, &[]);
        assert!(plan.users.is_empty());
    }

    #[test]
    fn test_sweep_assigns_user_that_entered_zone() {
        let zones = vec![rect(1, 0.0, 0.0, 10.0, 10.0)];
        let users = vec![user(1, None, Some((8.0, 8.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &users, &[]);
        assert_eq!(plan.users.len(), 1);
        assert_eq!(plan.users.first().and_then(|r| r.to), Some(ZoneId::new(1)));
    }

    #[test]
    fn test_sweep_moves_member_to_overlapping_zone() {
        // The user left zone 1 but is still inside the larger zone 2.
        let zones = vec![rect(1, 0.0, 0.0, 5.0, 5.0), rect(2, 0.0, 0.0, 50.0, 50.0)];
        let users = vec![user(1, Some(1), Some((8.0, 8.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &users, &[]);
        assert_eq!(plan.users.first().and_then(|r| r.to), Some(ZoneId::new(2)));
    }

    #[test]
    fn test_sweep_invalid_polygon_clears_members() {
        let zones = vec![ZoneShape {
            id: ZoneId::new(1),
            polygon: Polygon::default(),
        }];
        let users = vec![user(1, Some(1), Some((1.0, 1.0)))];
        let carts = vec![cart(1, Some(1), Some((1.0, 1.0))), cart(2, None, Some((1.0, 1.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &users, &carts);
        assert_eq!(plan.users.first().and_then(|r| r.to), None);
        assert_eq!(plan.carts.len(), 1);
        assert_eq!(plan.cart_changes(), 1);
    }

    #[test]
    fn test_sweep_keeps_unchanged_carts_for_pruning() {
        let zones = vec![rect(1, 0.0, 0.0, 10.0, 10.0)];
        let carts = vec![cart(7, Some(1), Some((5.0, 5.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &[], &carts);
        assert_eq!(plan.carts.len(), 1);
        assert_eq!(plan.cart_changes(), 0);
    }

    #[test]
    fn test_sweep_of_deleted_zone_only_touches_its_members() {
        let zones = vec![rect(2, 0.0, 0.0, 10.0, 10.0)];
        let carts = vec![cart(1, Some(1), Some((5.0, 5.0))), cart(2, None, Some((5.0, 5.0)))];
        let plan = plan_sweep(ZoneId::new(1), &zones, &[], &carts);
        assert_eq!(
            plan.carts,
            vec![Reassignment {
                id: CartId::new(1),
                from: Some(ZoneId::new(1)),
                to: Some(ZoneId::new(2))
            }]
        );
    }

    #[test]
    fn test_items_outside_roster() {
        let items = vec![item(1, 10), item(2, 20), item(3, 10)];
        let roster: Roster = [StoreId::new(10)].into_iter().collect();
        assert_eq!(
            items_outside_roster(&items, Some(&roster)),
            vec![CartItemId::new(2)]
        );
        assert_eq!(items_outside_roster(&items, None).len(), 3);
    }

    #[test]
    fn test_checkout_proceeds_when_consistent() {
        let items = vec![item(1, 10)];
        let roster: Roster = [StoreId::new(10)].into_iter().collect();
        assert_eq!(
            verify_checkout(Some(ZoneId::new(1)), &roster, &items),
            CheckoutVerdict::Proceed
        );
    }

    #[test]
    fn test_checkout_rejects_outside_items() {
        let items = vec![item(1, 10), item(2, 20)];
        let roster: Roster = [StoreId::new(10)].into_iter().collect();
        assert_eq!(
            verify_checkout(Some(ZoneId::new(1)), &roster, &items),
            CheckoutVerdict::Reject {
                reason: RejectReason::ItemsOutsideZone,
                removed: vec![CartItemId::new(2)]
            }
        );
    }

    #[test]
    fn test_checkout_rejects_without_zone_or_roster() {
        let items = vec![item(1, 10)];
        let roster: Roster = [StoreId::new(10)].into_iter().collect();
        assert!(matches!(
            verify_checkout(None, &roster, &items),
            CheckoutVerdict::Reject { reason: RejectReason::NoZone, ref removed } if removed.len() == 1
        ));
        assert!(matches!(
            verify_checkout(Some(ZoneId::new(1)), &Roster::new(), &[]),
            CheckoutVerdict::Reject {
                reason: RejectReason::EmptyRoster,
                ..
            }
        ));
    }
}
