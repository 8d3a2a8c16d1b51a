//! Geomarket Core - Shared types and zone logic.
//!
//! This crate provides the pieces of Geomarket that need no I/O:
//! - `storefront` - Shopper and operator HTTP service (uses everything here)
//! - `cli` - Command-line tools for migrations and zone sweeps
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure functions - no database
//! access, no HTTP clients. Every zone decision the service makes (which zone
//! contains a point, which users and carts a sweep touches, which cart items
//! must go) is computed here so it can be tested without a datastore.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices and cart status
//! - [`geo`] - Coordinates, polygons and the point-in-polygon test
//! - [`zoning`] - Zone resolution with a deterministic overlap tie-break
//! - [`reconcile`] - Sweep planning, cart pruning and checkout verdicts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod geo;
pub mod reconcile;
pub mod types;
pub mod zoning;

pub use geo::{Bounds, Coordinate, CoordinateError, Polygon};
pub use types::*;
pub use zoning::{Coverage, Roster, resolve};
