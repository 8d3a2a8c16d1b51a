//! Domain models for storefront.
//!
//! Plain data carried between repositories, services and handlers. Rows are
//! mapped into these types in `crate::db`.

pub mod cart;
pub mod order;
pub mod session;
pub mod store;
pub mod user;
pub mod zone;

pub use cart::{Cart, CartItem};
pub use order::{Order, OrderItem};
pub use session::{CurrentShopper, keys as session_keys};
pub use store::{Offer, Store, ZoneOffer};
pub use user::User;
pub use zone::Zone;
