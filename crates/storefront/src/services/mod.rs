//! Business logic services for storefront.
//!
//! # Services
//!
//! - `location` - Geocoding front end (`LocationNormalizer`)
//! - `zone_resolver` - Which zone governs a coordinate
//! - `cart_guard` - Cart/zone consistency on location change, item edits and checkout
//! - `zone_sync` - Membership sweeps after zone edits
//! - `zones` - Operator zone management

pub mod cart_guard;
pub mod location;
pub mod zone_resolver;
pub mod zone_sync;
pub mod zones;

pub use cart_guard::{CartError, CartZoneGuard};
pub use location::{LocationError, LocationInput, LocationNormalizer, ResolvedLocation};
pub use zone_sync::{SyncError, SyncReport, ZoneMembershipSynchronizer};
pub use zones::{ZoneAdmin, ZoneAdminError};
