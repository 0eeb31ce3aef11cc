//! Checkout orchestration against the fake backend.

use bazaar_core::{DeliveryMethod, OrderStatus, PaymentMethod, Price};
use bazaar_integration_tests::{FakeBackend, Method, StatusCode};
use bazaar_storefront::api::ApiError;
use bazaar_storefront::checkout::CheckoutError;
use bazaar_storefront::models::DeliveryInfo;

fn delivery() -> DeliveryInfo {
    DeliveryInfo {
        address: " Lenina 1, apt. 5 ".to_string(),
        phone: "+7 900 000-00-00".to_string(),
        delivery_method: DeliveryMethod::Courier,
        payment_method: PaymentMethod::Card,
        notes: Some("   ".to_string()),
    }
}

// ============================================================================
// Preconditions
// ============================================================================

#[tokio::test]
async fn test_empty_cart_is_rejected_without_a_request() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;
    backend.clear_log();

    let err = storefront
        .checkout()
        .checkout(&delivery())
        .await
        .expect_err("empty cart");

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert!(backend.requests().is_empty());
    assert!(backend.orders().is_empty());
}

#[tokio::test]
async fn test_blank_delivery_fields_are_rejected_without_a_request() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, _) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 1).await.expect("add");
    backend.clear_log();

    let info = DeliveryInfo {
        phone: " ".to_string(),
        ..delivery()
    };
    let err = storefront.checkout().checkout(&info).await.expect_err("no phone");

    assert!(matches!(err, CheckoutError::MissingDeliveryInfo("phone")));
    assert!(backend.requests().is_empty());
    assert_eq!(storefront.cart().lines().len(), 1);
}

// ============================================================================
// Placing Orders
// ============================================================================

#[tokio::test]
async fn test_checkout_submits_snapshot_prices_and_empties_cart() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let cup = backend.seed_product("Cup", Price::from_minor(12_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 2).await.expect("add tea");
    storefront.cart().add(cup.id, 1).await.expect("add cup");

    // A later price change does not affect what the buyer saw.
    backend.set_price(tea.id, Price::from_minor(99_900));

    let order = storefront
        .checkout()
        .checkout(&delivery())
        .await
        .expect("checkout");

    assert_eq!(order.total_price, Price::from_minor(82_000));
    assert_eq!(order.status, OrderStatus::Pending);

    let placed = backend.orders();
    assert_eq!(placed.len(), 1);
    let submitted = &placed[0];
    assert_eq!(submitted.delivery_address, "Lenina 1, apt. 5");
    assert!(submitted.notes.is_none());
    let tea_item = submitted
        .items
        .iter()
        .find(|i| i.product_id == tea.id)
        .expect("tea ordered");
    assert_eq!(tea_item.price, Price::from_minor(35_000));
    assert_eq!(tea_item.quantity, 2);

    assert!(storefront.cart().is_empty());
    assert!(backend.cart_of(user.id).is_empty());
    assert_eq!(backend.count(&Method::POST, "/orders/"), 1);
}

#[tokio::test]
async fn test_rejected_order_leaves_cart_unchanged() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 2).await.expect("add");
    backend.fail_next(Method::POST, "/orders/", StatusCode::SERVICE_UNAVAILABLE, 1);

    let err = storefront
        .checkout()
        .checkout(&delivery())
        .await
        .expect_err("order rejected");

    assert!(matches!(err, CheckoutError::Api(ApiError::Server { .. })));
    assert!(err.placed_order().is_none());
    assert_eq!(storefront.cart().item_count(), 2);
    assert_eq!(backend.cart_of(user.id).len(), 1);
}

#[tokio::test]
async fn test_partial_cleanup_failure_reports_placed_order() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let cup = backend.seed_product("Cup", Price::from_minor(12_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 1).await.expect("add tea");
    let stuck = storefront.cart().add(cup.id, 1).await.expect("add cup");
    backend.fail_next(
        Method::DELETE,
        &format!("/cart/{}", stuck.id),
        StatusCode::INTERNAL_SERVER_ERROR,
        1,
    );

    let err = storefront
        .checkout()
        .checkout(&delivery())
        .await
        .expect_err("cleanup failed");

    let CheckoutError::CartNotCleared { order, uncleared, .. } = &err else {
        panic!("expected CartNotCleared, got {err:?}");
    };
    assert_eq!(uncleared, &vec![stuck.id]);
    assert_eq!(order.total_price, Price::from_minor(47_000));
    assert_eq!(backend.orders().len(), 1);

    // Only the stuck line remains, locally and on the server.
    let lines = storefront.cart().lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].id, stuck.id);
    assert_eq!(backend.cart_of(user.id).len(), 1);
}

#[tokio::test]
async fn test_placed_order_appears_in_history() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, _) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 3).await.expect("add");
    let order = storefront
        .checkout()
        .checkout(&delivery())
        .await
        .expect("checkout");

    let history = storefront
        .client()
        .my_orders(&Default::default())
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, order.id);

    let detail = storefront.client().my_order(order.id).await.expect("detail");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_name.as_deref(), Some("Tea"));
    assert_eq!(detail.display_number(), order.display_number());
}
