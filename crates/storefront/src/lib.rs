//! Geomarket Storefront library.
//!
//! Location-gated shopping: shoppers set a delivery location, the zone it
//! falls in decides which stores may supply their cart, and operator zone
//! edits re-resolve every affected user and cart.
//!
//! The binary in `main.rs` wires these modules into an axum server; the
//! integration tests and the CLI use them directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod geocoding;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
