//! Session-related types.
//!
//! The external authentication collaborator writes the shopper identity into
//! the session; this service only reads it.

use serde::{Deserialize, Serialize};

use geomarket_core::UserId;

/// Session-stored shopper identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurrentShopper {
    /// User's database ID.
    pub id: UserId,
}

/// Session keys.
pub mod keys {
    /// Key for the signed-in shopper.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the shopper's cart ID.
    pub const CART_ID: &str = "cart_id";
}
