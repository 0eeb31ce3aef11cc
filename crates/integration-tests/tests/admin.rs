//! Back-office API calls and catalog cache invalidation.

use bazaar_core::{DeliveryMethod, OrderStatus, PaymentMethod, Price};
use bazaar_integration_tests::{FakeBackend, Method};
use bazaar_storefront::api::ApiError;
use bazaar_storefront::models::{DeliveryInfo, OrderListQuery, ProductInput, ProductQuery, ProductSpec};

fn spec(name: &str, value: &str) -> ProductSpec {
    ProductSpec {
        id: None,
        spec_name: name.to_string(),
        spec_value: value.to_string(),
        order: None,
    }
}

// ============================================================================
// Access
// ============================================================================

#[tokio::test]
async fn test_customer_cannot_use_admin_endpoints() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;

    let err = storefront
        .client()
        .admin_orders(&OrderListQuery::default())
        .await
        .expect_err("customer");

    assert!(matches!(err, ApiError::Forbidden(_)));
    assert!(!storefront.session().can_administer());
    // A 403 is not an expired session.
    assert!(storefront.session().state().is_authenticated());
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_product_reads_are_cached_until_catalog_changes() {
    let backend = FakeBackend::start().await;
    let kettle = backend.seed_product("Kettle", Price::from_minor(199_000), 5);
    let (admin, _) = backend.admin("root").await;
    let client = admin.client();

    let first = client.product(kettle.id).await.expect("product");
    backend.set_price(kettle.id, Price::from_minor(150_000));
    let cached = client.product(kettle.id).await.expect("product");
    assert_eq!(cached.price, first.price);
    assert_eq!(backend.count(&Method::GET, &format!("/products/{}", kettle.id)), 1);

    client
        .update_product(
            kettle.id,
            ProductInput {
                name: "Kettle Pro".to_string(),
                description: "Steel".to_string(),
                price: Price::from_minor(210_000),
                category_id: kettle.category_id,
                stock: 3,
                image_url: String::new(),
                specs: vec![spec("Power", "2 kW"), spec(" ", "")],
            },
        )
        .await
        .expect("update");

    let fresh = client.product(kettle.id).await.expect("product");
    assert_eq!(fresh.name, "Kettle Pro");
    assert_eq!(fresh.price, Price::from_minor(210_000));

    let specs = client.product_specs(kettle.id).await.expect("specs");
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].spec_name, "Power");
}

#[tokio::test]
async fn test_category_changes_invalidate_cached_listing() {
    let backend = FakeBackend::start().await;
    backend.seed_product("Kettle", Price::from_minor(199_000), 5);
    let (admin, _) = backend.admin("root").await;
    let client = admin.client();

    assert_eq!(client.categories().await.expect("categories").len(), 1);
    let created = client.create_category("Tea").await.expect("create");
    let categories = client.categories().await.expect("categories");
    assert!(categories.iter().any(|c| c.id == created.id));

    client
        .rename_category(created.id, "Green tea")
        .await
        .expect("rename");
    let categories = client.categories().await.expect("categories");
    assert!(categories.iter().any(|c| c.name == "Green tea"));

    client.delete_category(created.id).await.expect("delete");
    assert_eq!(client.categories().await.expect("categories").len(), 1);
}

#[tokio::test]
async fn test_search_bypasses_listing_cache() {
    let backend = FakeBackend::start().await;
    backend.seed_product("Green tea", Price::from_minor(35_000), 5);
    backend.seed_product("Kettle", Price::from_minor(199_000), 5);
    let storefront = backend.storefront();
    let query = ProductQuery {
        search: Some("tea".to_string()),
        ..ProductQuery::default()
    };

    let found = storefront.client().list_products(&query).await.expect("search");
    storefront.client().list_products(&query).await.expect("search");

    assert_eq!(found.len(), 1);
    assert_eq!(backend.count(&Method::GET, "/products/"), 2);
}

#[tokio::test]
async fn test_created_and_deleted_products_show_in_listing() {
    let backend = FakeBackend::start().await;
    let category = backend.seed_category("Kitchen");
    let (admin, _) = backend.admin("root").await;
    let client = admin.client();

    assert!(client.list_products(&ProductQuery::default()).await.expect("list").is_empty());
    let product = client
        .create_product(ProductInput {
            name: "Toaster".to_string(),
            description: String::new(),
            price: Price::from_minor(250_000),
            category_id: category.id,
            stock: 2,
            image_url: String::new(),
            specs: vec![spec("Slots", "2")],
        })
        .await
        .expect("create");
    assert_eq!(client.list_products(&ProductQuery::default()).await.expect("list").len(), 1);

    client.delete_product(product.id).await.expect("delete");
    assert!(client.list_products(&ProductQuery::default()).await.expect("list").is_empty());
}

// ============================================================================
// Orders & Users
// ============================================================================

#[tokio::test]
async fn test_admin_status_change_is_visible_to_customer() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (customer, _) = backend.customer("ivan").await;
    let (admin, _) = backend.admin("root").await;
    customer.cart().add(tea.id, 2).await.expect("add");
    let order = customer
        .checkout()
        .checkout(&DeliveryInfo {
            address: "Lenina 1".to_string(),
            phone: "123".to_string(),
            delivery_method: DeliveryMethod::Pickup,
            payment_method: PaymentMethod::Cash,
            notes: None,
        })
        .await
        .expect("checkout");

    let pending = admin
        .client()
        .admin_orders(&OrderListQuery {
            status: Some(OrderStatus::Pending),
            ..OrderListQuery::default()
        })
        .await
        .expect("orders");
    assert_eq!(pending.len(), 1);

    admin
        .client()
        .set_order_status(order.id, OrderStatus::Delivered)
        .await
        .expect("set status");

    let seen = customer.client().my_order(order.id).await.expect("order");
    assert_eq!(seen.status, OrderStatus::Delivered);

    let stats = admin.client().order_statistics().await.expect("stats");
    assert_eq!(stats.total_orders, 1);
    assert_eq!(stats.pending_orders, 0);
    assert_eq!(stats.delivered_orders, 1);
    assert_eq!(stats.total_revenue, Price::from_minor(70_000));
}

#[tokio::test]
async fn test_role_change_and_user_removal() {
    let backend = FakeBackend::start().await;
    let (admin, root) = backend.admin("root").await;
    let olga = backend.seed_user("olga", "secret1", false);

    let promoted = admin
        .client()
        .set_user_role(olga.id, true)
        .await
        .expect("promote");
    assert!(promoted.is_admin);

    admin.client().delete_user(olga.id).await.expect("delete");
    let users = admin.client().users().await.expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, root.id);
}
