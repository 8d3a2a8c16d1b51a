//! Cart/zone consistency.
//!
//! Every operation that can change which items a cart may hold runs in one
//! transaction holding the cart row lock: location commits, item edits and
//! checkout. Pruning derives roster membership inside the DELETE itself, so
//! it judges items against the roster as it is at that moment.
//!
//! A location commit also holds the zone set lock shared, taken before the
//! cart row lock, so zone edits wait for it and it resolves against zones
//! no edit is about to change.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use geomarket_core::reconcile::{
    CheckoutVerdict, ItemPlacement, RejectReason, items_outside_roster, verify_checkout,
};
use geomarket_core::{
    CartId, CartItemId, CartStatus, CurrencyCode, OfferId, Roster, StoreId, UserId, ZoneId,
};

use crate::db::{RepositoryError, carts, locks, orders, stores, users, zones};
use crate::models::cart::total;
use crate::models::{Cart, CartItem, Order, Zone};
use crate::services::location::ResolvedLocation;
use crate::services::zone_resolver::find_zone_for_point;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Bad input (quantity, empty cart).
    #[error("{0}")]
    Validation(String),

    /// Missing cart, item, offer or user.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The cart is no longer open.
    #[error("cart is {0}")]
    Closed(CartStatus),

    /// Items can only be added once the cart has a delivery zone.
    #[error("cart has no delivery zone")]
    NoZone,

    /// The offer's store does not deliver to the cart's zone.
    #[error("store {store_id} does not deliver to zone {zone_id}")]
    OutsideZone { store_id: StoreId, zone_id: ZoneId },

    /// Not enough stock for the requested quantity.
    #[error("only {available} in stock")]
    InsufficientStock { available: i32 },

    /// Checkout found undeliverable items. They were removed; no order exists.
    #[error("checkout rejected ({reason}), {count} item(s) removed", count = .removed.len())]
    CheckoutConflict {
        reason: RejectReason,
        removed: Vec<CartItemId>,
        version: i32,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Result of a location dry run.
#[derive(Debug, Clone, Serialize)]
pub struct LocationPreview {
    pub zone: Option<Zone>,
    pub previous_zone_id: Option<ZoneId>,
    pub zone_changed: bool,
    /// Items the commit would remove.
    pub items_to_remove: usize,
}

/// Result of committing a location.
#[derive(Debug, Clone, Serialize)]
pub struct LocationUpdate {
    pub cart_id: CartId,
    pub zone: Option<Zone>,
    pub previous_zone_id: Option<ZoneId>,
    pub zone_changed: bool,
    pub removed_items: Vec<CartItemId>,
    pub version: i32,
}

/// A cart with its items.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
    pub total: Decimal,
}

fn ensure_open(cart: &Cart) -> Result<(), CartError> {
    if cart.status.is_open() {
        Ok(())
    } else {
        Err(CartError::Closed(cart.status))
    }
}

/// A cart owned by someone else is reported as missing.
fn ensure_owner(cart: &Cart, shopper: Option<UserId>) -> Result<(), CartError> {
    match cart.user_id {
        Some(owner) if Some(owner) != shopper => Err(CartError::NotFound("cart")),
        _ => Ok(()),
    }
}

fn placements(items: &[CartItem]) -> Vec<ItemPlacement> {
    items.iter().map(CartItem::placement).collect()
}

/// Per-request cart/zone consistency checks.
pub struct CartZoneGuard<'a> {
    pool: &'a PgPool,
}

impl<'a> CartZoneGuard<'a> {
    /// Create a guard over `pool`.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The shopper's current open cart, if any.
    ///
    /// Prefers the session's cart; falls back to the signed-in user's most
    /// recent open cart.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    pub async fn current_cart(
        &self,
        session_cart: Option<CartId>,
        shopper: Option<UserId>,
    ) -> Result<Option<Cart>, CartError> {
        if let Some(id) = session_cart
            && let Some(cart) = carts::get_cart(self.pool, id).await?
            && cart.status.is_open()
            && ensure_owner(&cart, shopper).is_ok()
        {
            return Ok(Some(cart));
        }

        match shopper {
            Some(user_id) => Ok(carts::find_open_cart_for_user(self.pool, user_id).await?),
            None => Ok(None),
        }
    }

    /// The shopper's current open cart, created if there is none.
    ///
    /// An anonymous cart is adopted by the shopper once they sign in.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    pub async fn ensure_cart(
        &self,
        session_cart: Option<CartId>,
        shopper: Option<UserId>,
    ) -> Result<Cart, CartError> {
        match self.current_cart(session_cart, shopper).await? {
            Some(mut cart) => {
                if cart.user_id.is_none()
                    && let Some(user_id) = shopper
                {
                    carts::assign_owner(self.pool, cart.id, user_id).await?;
                    cart.user_id = Some(user_id);
                }
                Ok(cart)
            }
            None => {
                let cart = carts::create_cart(self.pool, shopper).await?;
                tracing::info!(cart_id = %cart.id, "Cart created");
                Ok(cart)
            }
        }
    }

    /// A cart with its items and total.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    pub async fn view(&self, cart: Cart) -> Result<CartView, CartError> {
        let items = carts::list_cart_items_with_store(self.pool, cart.id).await?;
        let total = total(&items);
        Ok(CartView { cart, items, total })
    }

    /// Resolve the zone for `location` without changing anything.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    #[instrument(skip(self, cart, location), fields(cart_id = ?cart.map(|c| c.id)))]
    pub async fn preview_location(
        &self,
        cart: Option<&Cart>,
        location: &ResolvedLocation,
    ) -> Result<LocationPreview, CartError> {
        let zone = find_zone_for_point(self.pool, location.coordinate).await?;
        let zone_id = zone.as_ref().map(|z| z.id);

        let (previous_zone_id, items_to_remove) = match cart {
            Some(cart) => {
                let items = carts::list_cart_items_with_store(self.pool, cart.id).await?;
                let roster = match zone_id {
                    Some(id) => Some(zones::roster(self.pool, id).await?),
                    None => None,
                };
                let outside = items_outside_roster(&placements(&items), roster.as_ref());
                (cart.zone_id, outside.len())
            }
            None => (None, 0),
        };

        Ok(LocationPreview {
            zone,
            previous_zone_id,
            zone_changed: previous_zone_id != zone_id,
            items_to_remove,
        })
    }

    /// Commit a new delivery location to a cart (and the signed-in user).
    ///
    /// Resolves the zone, writes it with the location onto the cart, and
    /// removes every item whose store is not on the new zone's roster. No
    /// zone means every item goes.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` for a missing cart or user and
    /// `CartError::Closed` if the cart is no longer open.
    #[instrument(skip(self, location), fields(cart_id = %cart_id))]
    pub async fn update_location(
        &self,
        cart_id: CartId,
        shopper: Option<UserId>,
        location: &ResolvedLocation,
    ) -> Result<LocationUpdate, CartError> {
        let mut tx = self.pool.begin().await?;
        locks::lock_zone_set_for_location(&mut *tx).await?;

        let cart = carts::lock_cart(&mut *tx, cart_id)
            .await?
            .ok_or(CartError::NotFound("cart"))?;
        ensure_owner(&cart, shopper)?;
        ensure_open(&cart)?;

        let zone = find_zone_for_point(&mut *tx, location.coordinate).await?;
        let zone_id = zone.as_ref().map(|z| z.id);

        let version = carts::update_cart_zone_and_location(
            &mut *tx,
            cart_id,
            zone_id,
            location.address.as_deref(),
            Some(location.coordinate),
        )
        .await?;
        let removed_items = carts::prune_items_outside_zone(&mut *tx, cart_id, zone_id).await?;

        if let Some(user_id) = shopper {
            users::lock_user(&mut *tx, user_id)
                .await?
                .ok_or(CartError::NotFound("user"))?;
            users::update_user_location(
                &mut *tx,
                user_id,
                location.address.as_deref(),
                Some(location.coordinate),
                zone_id,
            )
            .await?;
            if cart.user_id.is_none() {
                carts::assign_owner(&mut *tx, cart_id, user_id).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            zone_id = ?zone_id,
            previous_zone_id = ?cart.zone_id,
            removed = removed_items.len(),
            "Cart location updated"
        );

        Ok(LocationUpdate {
            cart_id,
            zone,
            previous_zone_id: cart.zone_id,
            zone_changed: cart.zone_id != zone_id,
            removed_items,
            version,
        })
    }

    /// Add an offer to a cart.
    ///
    /// The cart must have a zone whose roster includes the offer's store and
    /// the offer must have stock for the cart's total quantity of it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NoZone`, `CartError::OutsideZone` or
    /// `CartError::InsufficientStock` when the item cannot be added.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        shopper: Option<UserId>,
        offer_id: OfferId,
        quantity: i32,
    ) -> Result<CartItem, CartError> {
        if quantity <= 0 {
            return Err(CartError::Validation(
                "quantity must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_cart(&mut *tx, cart_id)
            .await?
            .ok_or(CartError::NotFound("cart"))?;
        ensure_owner(&cart, shopper)?;
        ensure_open(&cart)?;
        let zone_id = cart.zone_id.ok_or(CartError::NoZone)?;

        let offer = stores::get_offer(&mut *tx, offer_id)
            .await?
            .ok_or(CartError::NotFound("offer"))?;
        let roster: Roster = zones::roster(&mut *tx, zone_id).await?;
        if !roster.contains(&offer.store_id) {
            return Err(CartError::OutsideZone {
                store_id: offer.store_id,
                zone_id,
            });
        }

        let already: i32 = carts::list_cart_items_with_store(&mut *tx, cart_id)
            .await?
            .iter()
            .filter(|item| item.offer_id == offer_id)
            .map(|item| item.quantity)
            .sum();
        if !offer.has_stock_for(already.saturating_add(quantity)) {
            return Err(CartError::InsufficientStock {
                available: offer.stock,
            });
        }

        let item = carts::add_item(&mut *tx, cart_id, &offer, quantity).await?;
        tx.commit().await?;

        tracing::info!(item_id = %item.id, %offer_id, quantity, "Item added to cart");
        Ok(item)
    }

    /// Set an item's quantity. Zero removes the item and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for a negative quantity and
    /// `CartError::InsufficientStock` when the offer cannot cover it.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn update_item_quantity(
        &self,
        cart_id: CartId,
        shopper: Option<UserId>,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, CartError> {
        if quantity < 0 {
            return Err(CartError::Validation(
                "quantity cannot be negative".to_string(),
            ));
        }
        if quantity == 0 {
            self.remove_item(cart_id, shopper, item_id).await?;
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_cart(&mut *tx, cart_id)
            .await?
            .ok_or(CartError::NotFound("cart"))?;
        ensure_owner(&cart, shopper)?;
        ensure_open(&cart)?;

        let item = carts::list_cart_items_with_store(&mut *tx, cart_id)
            .await?
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or(CartError::NotFound("cart item"))?;
        let offer = stores::get_offer(&mut *tx, item.offer_id)
            .await?
            .ok_or(CartError::NotFound("offer"))?;
        if !offer.has_stock_for(quantity) {
            return Err(CartError::InsufficientStock {
                available: offer.stock,
            });
        }

        let item = carts::set_item_quantity(&mut *tx, cart_id, item_id, quantity).await?;
        tx.commit().await?;
        Ok(Some(item))
    }

    /// Remove an item from a cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if the item is not in the cart.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        shopper: Option<UserId>,
        item_id: CartItemId,
    ) -> Result<(), CartError> {
        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_cart(&mut *tx, cart_id)
            .await?
            .ok_or(CartError::NotFound("cart"))?;
        ensure_owner(&cart, shopper)?;
        ensure_open(&cart)?;

        let removed = carts::delete_cart_items(&mut *tx, cart_id, &[item_id]).await?;
        if removed.is_empty() {
            return Err(CartError::NotFound("cart item"));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Check out a cart.
    ///
    /// Re-validates every item against the cart's zone as it is now. If the
    /// cart has no zone, the zone has no stores, or any item's store left
    /// the roster, the offending items are removed, that removal is committed,
    /// and `CartError::CheckoutConflict` is returned with no order created.
    /// Otherwise the order is created and the cart completed together.
    ///
    /// Checking out a cart that already has an order returns that order.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CheckoutConflict` as above, `CartError::Validation`
    /// for an empty cart and `CartError::Closed` for a cart that is not open.
    #[instrument(skip(self), fields(cart_id = %cart_id, user_id = %shopper))]
    pub async fn checkout(
        &self,
        cart_id: CartId,
        shopper: UserId,
        currency: CurrencyCode,
    ) -> Result<Order, CartError> {
        let mut tx = self.pool.begin().await?;

        let mut cart = carts::lock_cart(&mut *tx, cart_id)
            .await?
            .ok_or(CartError::NotFound("cart"))?;
        ensure_owner(&cart, Some(shopper))?;

        if let Some(order) = orders::find_order_for_cart(&mut *tx, cart_id).await? {
            tracing::info!(order_id = %order.id, "Checkout repeated, returning existing order");
            return Ok(order);
        }
        ensure_open(&cart)?;

        let items = carts::list_cart_items_with_store(&mut *tx, cart_id).await?;
        if items.is_empty() {
            return Err(CartError::Validation("cart is empty".to_string()));
        }

        let roster = match cart.zone_id {
            Some(zone_id) => zones::roster(&mut *tx, zone_id).await?,
            None => Roster::new(),
        };

        match verify_checkout(cart.zone_id, &roster, &placements(&items)) {
            CheckoutVerdict::Reject { reason, removed } => {
                let removed = carts::delete_cart_items(&mut *tx, cart_id, &removed).await?;
                let version = carts::bump_version(&mut *tx, cart_id).await?;
                tx.commit().await?;

                tracing::warn!(%reason, removed = removed.len(), "Checkout rejected");
                Err(CartError::CheckoutConflict {
                    reason,
                    removed,
                    version,
                })
            }
            CheckoutVerdict::Proceed => {
                if cart.user_id.is_none() {
                    carts::assign_owner(&mut *tx, cart_id, shopper).await?;
                    cart.user_id = Some(shopper);
                }
                let order = orders::create_order(&mut *tx, &cart, &items, currency).await?;
                carts::mark_completed(&mut *tx, cart_id).await?;
                tx.commit().await?;

                tracing::info!(order_id = %order.id, total = %order.total, "Order created");
                Ok(order)
            }
        }
    }
}
