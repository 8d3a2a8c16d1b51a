//! Location commits, zone-gated cart edits and checkout.
//!
//! Each test gets a fresh database with the storefront migrations applied.
//! Run with: `cargo test -p geomarket-integration-tests -- --ignored`

#![allow(clippy::unwrap_used)]

use geomarket_core::reconcile::RejectReason;
use geomarket_core::{CartStatus, CurrencyCode};
use geomarket_integration_tests::{at, coord, square, stocked_store, zone_with_roster};
use geomarket_storefront::db::{carts, orders, stores, users, zones};
use geomarket_storefront::services::{CartError, CartZoneGuard};
use rust_decimal::Decimal;
use sqlx::PgPool;

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_committing_same_location_twice_is_idempotent(pool: PgPool) {
    let shop = stocked_store(&pool, "Corner", coord(0.5, 0.5), Decimal::new(300, 2), 10)
        .await
        .unwrap();
    let zone = zone_with_roster(&pool, "Z", square(0.0, 0.0, 1.0), vec![shop.store.id])
        .await
        .unwrap();
    let user = users::create_user(&pool).await.unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, Some(user.id)).await.unwrap();

    let first = guard
        .update_location(cart.id, Some(user.id), &at(0.5, 0.5))
        .await
        .unwrap();
    assert!(first.zone_changed);
    assert_eq!(first.zone.map(|z| z.id), Some(zone.id));

    guard
        .add_item(cart.id, Some(user.id), shop.offer.id, 1)
        .await
        .unwrap();

    let second = guard
        .update_location(cart.id, Some(user.id), &at(0.5, 0.5))
        .await
        .unwrap();
    assert!(!second.zone_changed);
    assert!(second.removed_items.is_empty());
    assert_eq!(
        carts::list_cart_items_with_store(&pool, cart.id).await.unwrap().len(),
        1
    );
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_moving_out_of_coverage_empties_cart(pool: PgPool) {
    let shop = stocked_store(&pool, "Corner", coord(0.5, 0.5), Decimal::new(300, 2), 10)
        .await
        .unwrap();
    zone_with_roster(&pool, "Z", square(0.0, 0.0, 1.0), vec![shop.store.id])
        .await
        .unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, None).await.unwrap();
    guard.update_location(cart.id, None, &at(0.5, 0.5)).await.unwrap();
    let item = guard.add_item(cart.id, None, shop.offer.id, 2).await.unwrap();

    let update = guard.update_location(cart.id, None, &at(30.0, 30.0)).await.unwrap();
    assert!(update.zone.is_none());
    assert_eq!(update.removed_items, vec![item.id]);

    // Preview against the empty cart now reports nothing to remove.
    let cart = carts::get_cart(&pool, cart.id).await.unwrap().unwrap();
    let preview = guard.preview_location(Some(&cart), &at(0.5, 0.5)).await.unwrap();
    assert!(preview.zone_changed);
    assert_eq!(preview.items_to_remove, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_add_item_is_zone_gated(pool: PgPool) {
    let inside = stocked_store(&pool, "Inside", coord(0.5, 0.5), Decimal::new(300, 2), 1)
        .await
        .unwrap();
    let outside = stocked_store(&pool, "Outside", coord(9.0, 9.0), Decimal::new(100, 2), 10)
        .await
        .unwrap();
    zone_with_roster(&pool, "Z", square(0.0, 0.0, 1.0), vec![inside.store.id])
        .await
        .unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, None).await.unwrap();

    assert!(matches!(
        guard.add_item(cart.id, None, inside.offer.id, 1).await,
        Err(CartError::NoZone)
    ));

    guard.update_location(cart.id, None, &at(0.5, 0.5)).await.unwrap();
    assert!(matches!(
        guard.add_item(cart.id, None, outside.offer.id, 1).await,
        Err(CartError::OutsideZone { .. })
    ));
    assert!(matches!(
        guard.add_item(cart.id, None, inside.offer.id, 2).await,
        Err(CartError::InsufficientStock { available: 1 })
    ));
    guard.add_item(cart.id, None, inside.offer.id, 1).await.unwrap();
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_conflict_then_retry_creates_one_order(pool: PgPool) {
    let kept = stocked_store(&pool, "Kept", coord(0.2, 0.2), Decimal::new(250, 2), 10)
        .await
        .unwrap();
    let dropped = stocked_store(&pool, "Dropped", coord(0.8, 0.8), Decimal::new(400, 2), 10)
        .await
        .unwrap();
    let zone = zone_with_roster(
        &pool,
        "Z",
        square(0.0, 0.0, 1.0),
        vec![kept.store.id, dropped.store.id],
    )
    .await
    .unwrap();

    let user = users::create_user(&pool).await.unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, Some(user.id)).await.unwrap();
    guard
        .update_location(cart.id, Some(user.id), &at(0.5, 0.5))
        .await
        .unwrap();
    guard
        .add_item(cart.id, Some(user.id), kept.offer.id, 2)
        .await
        .unwrap();
    let stale = guard
        .add_item(cart.id, Some(user.id), dropped.offer.id, 1)
        .await
        .unwrap();

    // Roster shrinks without a sweep reaching this cart yet.
    let mut conn = pool.acquire().await.unwrap();
    zones::replace_roster(&mut *conn, zone.id, &[kept.store.id])
        .await
        .unwrap();

    let conflict = guard.checkout(cart.id, user.id, CurrencyCode::EUR).await;
    let Err(CartError::CheckoutConflict {
        reason, removed, ..
    }) = conflict
    else {
        panic!("expected checkout conflict, got {conflict:?}");
    };
    assert_eq!(reason, RejectReason::ItemsOutsideZone);
    assert_eq!(removed, vec![stale.id]);
    assert!(orders::find_order_for_cart(&mut *conn, cart.id).await.unwrap().is_none());
    let open = carts::get_cart(&pool, cart.id).await.unwrap().unwrap();
    assert_eq!(open.status, CartStatus::Shopping);

    let order = guard
        .checkout(cart.id, user.id, CurrencyCode::EUR)
        .await
        .unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total, Decimal::new(500, 2));
    assert_eq!(order.zone_id, Some(zone.id));
    assert_eq!(order.currency, CurrencyCode::EUR);

    // A repeated checkout returns the same order.
    let again = guard
        .checkout(cart.id, user.id, CurrencyCode::EUR)
        .await
        .unwrap();
    assert_eq!(again.id, order.id);

    let completed = carts::get_cart(&pool, cart.id).await.unwrap().unwrap();
    assert_eq!(completed.status, CartStatus::Completed);
    assert!(matches!(
        guard.add_item(cart.id, Some(user.id), kept.offer.id, 1).await,
        Err(CartError::Closed(CartStatus::Completed))
    ));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_without_zone_is_rejected(pool: PgPool) {
    let shop = stocked_store(&pool, "Corner", coord(0.5, 0.5), Decimal::new(300, 2), 10)
        .await
        .unwrap();
    zone_with_roster(&pool, "Z", square(0.0, 0.0, 1.0), vec![shop.store.id])
        .await
        .unwrap();
    let user = users::create_user(&pool).await.unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, Some(user.id)).await.unwrap();
    guard
        .update_location(cart.id, Some(user.id), &at(0.5, 0.5))
        .await
        .unwrap();
    guard
        .add_item(cart.id, Some(user.id), shop.offer.id, 1)
        .await
        .unwrap();

    // Zone cleared behind the guard's back.
    carts::update_cart_zone(&pool, cart.id, None).await.unwrap();

    let result = guard.checkout(cart.id, user.id, CurrencyCode::USD).await;
    assert!(matches!(
        result,
        Err(CartError::CheckoutConflict {
            reason: RejectReason::NoZone,
            ..
        })
    ));
    assert!(carts::list_cart_items_with_store(&pool, cart.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_other_shoppers_cart_is_not_found(pool: PgPool) {
    let owner = users::create_user(&pool).await.unwrap();
    let intruder = users::create_user(&pool).await.unwrap();
    let guard = CartZoneGuard::new(&pool);
    let cart = guard.ensure_cart(None, Some(owner.id)).await.unwrap();

    assert!(matches!(
        guard
            .update_location(cart.id, Some(intruder.id), &at(0.5, 0.5))
            .await,
        Err(CartError::NotFound("cart"))
    ));
    assert!(
        guard
            .current_cart(Some(cart.id), Some(intruder.id))
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_lowest_price_skips_empty_and_outside_offers(pool: PgPool) {
    let stocked = stocked_store(&pool, "Stocked", coord(0.5, 0.5), Decimal::new(500, 2), 3)
        .await
        .unwrap();
    let product = stocked.product_id;

    let sold_out = stores::create_store(&pool, "Sold out", coord(0.2, 0.2)).await.unwrap();
    stores::upsert_offer(&pool, sold_out.id, product, Decimal::new(200, 2), 0)
        .await
        .unwrap();
    let outside = stores::create_store(&pool, "Outside", coord(5.0, 5.0)).await.unwrap();
    stores::upsert_offer(&pool, outside.id, product, Decimal::new(100, 2), 10)
        .await
        .unwrap();

    let zone = zone_with_roster(
        &pool,
        "Z",
        square(0.0, 0.0, 1.0),
        vec![stocked.store.id, sold_out.id],
    )
    .await
    .unwrap();

    let lowest = stores::lowest_price_in_zone(&pool, product, zone.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lowest.offer_id, stocked.offer.id);
    assert_eq!(lowest.price, Decimal::new(500, 2));

    let empty = zone_with_roster(&pool, "Empty", square(10.0, 10.0, 1.0), Vec::new())
        .await
        .unwrap();
    assert!(
        stores::lowest_price_in_zone(&pool, product, empty.id)
            .await
            .unwrap()
            .is_none()
    );
}
