//! Transparent session refresh and invalidation.

use std::time::Duration;

use bazaar_core::Price;
use bazaar_integration_tests::{DEFAULT_PASSWORD, FakeBackend, Method, StatusCode};
use bazaar_storefront::api::{ApiError, SessionEvent};
use bazaar_storefront::session::SessionState;
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinSet;

const REFRESH: &str = "/users/refresh";

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_expired_session_is_refreshed_and_request_retried_once() {
    let backend = FakeBackend::start().await;
    let (storefront, user) = backend.customer("ivan").await;
    backend.expire_sessions();
    backend.clear_log();

    let me = storefront.client().current_user().await.expect("retried request");

    assert_eq!(me.id, user.id);
    assert_eq!(backend.count(&Method::POST, REFRESH), 1);
    assert_eq!(backend.count(&Method::GET, "/users/me"), 2);

    // The retry carries the refreshed token, not the expired one.
    let new_token = storefront.client().access_token().expect("token");
    let requests = backend.requests();
    let first = requests.first().and_then(|r| r.token.clone());
    let last = requests.last().and_then(|r| r.token.clone());
    assert_eq!(last.as_deref(), Some(new_token.expose_secret()));
    assert_ne!(first, last);
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, _) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 1).await.expect("add");
    backend.expire_sessions();
    backend.clear_log();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let client = storefront.client().clone();
        tasks.spawn(async move { client.cart_lines().await });
    }
    while let Some(result) = tasks.join_next().await {
        let lines = result.expect("task panicked").expect("cart lines");
        assert_eq!(lines.len(), 1);
    }

    assert_eq!(backend.count(&Method::POST, REFRESH), 1);
    assert!(storefront.session().state().is_authenticated());
}

#[tokio::test]
async fn test_second_rejection_is_not_retried_again() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;
    backend.clear_log();
    backend.fail_next(Method::GET, "/cart/", StatusCode::UNAUTHORIZED, 2);

    let err = storefront.client().cart_lines().await.expect_err("rejected twice");

    assert!(matches!(err, ApiError::AuthInvalid));
    assert_eq!(backend.count(&Method::GET, "/cart/"), 2);
    assert_eq!(backend.count(&Method::POST, REFRESH), 1);
    assert!(!storefront.client().has_credentials());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_failed_refresh_resets_session_and_cart() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 2).await.expect("add");
    backend.expire_sessions();
    backend.fail_refresh(true);

    let err = storefront.cart().increment(tea.id).await.expect_err("refresh refused");
    assert!(err.api_error().is_some_and(ApiError::is_auth));

    // Both stores are reset by the time the error is returned.
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(storefront.cart().is_empty());
    assert!(!storefront.client().has_credentials());
    // Nothing changed on the server.
    assert_eq!(backend.cart_of(user.id)[0].quantity, 2);
}

#[tokio::test]
async fn test_invalidation_does_not_undo_a_later_sign_in() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    backend.seed_cart_line(user.id, tea.id, 2);
    let mut events = storefront.client().subscribe_events();
    backend.fail_next(Method::GET, "/cart/", StatusCode::UNAUTHORIZED, 2);

    let err = storefront.client().cart_lines().await.expect_err("rejected twice");
    assert!(matches!(err, ApiError::AuthInvalid));
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::Invalidated { .. })
    ));

    storefront.session().login(user.clone());
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(storefront.session().state(), SessionState::Authenticated(user.clone()));

    storefront
        .sign_in("ivan", &SecretString::from(DEFAULT_PASSWORD))
        .await
        .expect("sign in again");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(storefront.session().state(), SessionState::Authenticated(user));
    assert_eq!(storefront.cart().item_count(), 2);
}

// ============================================================================
// No Refresh
// ============================================================================

#[tokio::test]
async fn test_rejection_without_credentials_is_not_refreshed() {
    let backend = FakeBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront.client().cart_lines().await.expect_err("anonymous");

    assert!(matches!(err, ApiError::AuthExpired(_)));
    assert_eq!(backend.count(&Method::POST, REFRESH), 0);
}

#[tokio::test]
async fn test_bad_login_never_triggers_refresh() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;
    backend.clear_log();

    // Signed in, so a cookie is attached; the login call must still not refresh.
    let err = storefront
        .client()
        .login("ivan", &SecretString::from("wrong-password"))
        .await
        .expect_err("bad password");

    assert!(matches!(err, ApiError::AuthExpired(_)));
    assert_eq!(backend.count(&Method::POST, REFRESH), 0);
    assert!(storefront.client().has_credentials());
}
