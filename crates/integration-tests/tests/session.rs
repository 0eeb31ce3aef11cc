//! Session store and sign-in flows against the fake backend.

use bazaar_core::{Email, Price, UserId};
use bazaar_integration_tests::{DEFAULT_PASSWORD, FakeBackend, Method, offline_storefront};
use bazaar_storefront::models::{NewUser, User, UserPatch};
use bazaar_storefront::session::{SessionError, SessionState};
use secrecy::{ExposeSecret, SecretString};

fn new_user(login: &str, password: &str) -> NewUser {
    NewUser {
        login: login.to_string(),
        username: login.to_string(),
        email: Email::parse(&format!("{login}@example.com")).expect("valid email"),
        password: SecretString::from(password),
    }
}

// ============================================================================
// Sign-in & Restore
// ============================================================================

#[tokio::test]
async fn test_sign_in_authenticates_and_stores_cookie_token() {
    let backend = FakeBackend::start().await;
    let (storefront, user) = backend.customer("ivan").await;

    assert_eq!(storefront.session().state(), SessionState::Authenticated(user.clone()));
    assert!(storefront.session().can_use_cart());
    assert!(!storefront.session().can_administer());

    let token = storefront.client().access_token().expect("token stored");
    let me = backend
        .requests()
        .into_iter()
        .find(|r| r.path == "/users/me")
        .expect("identity fetched");
    assert_eq!(me.token.as_deref(), Some(token.expose_secret()));
}

#[tokio::test]
async fn test_restored_token_resolves_session_and_cart() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (first, user) = backend.customer("ivan").await;
    first.cart().add(tea.id, 3).await.expect("add");
    let token = first.client().access_token().expect("token");

    let restored = backend.storefront();
    restored.client().set_access_token(token);
    let state = restored.start().await;

    assert_eq!(state.user().map(|u| u.id), Some(user.id));
    assert_eq!(restored.cart().item_count(), 3);
}

#[tokio::test]
async fn test_init_without_credentials_is_anonymous() {
    let backend = FakeBackend::start().await;
    let storefront = backend.storefront();
    assert_eq!(storefront.session().state(), SessionState::Uninitialized);

    let state = storefront.start().await;
    assert_eq!(state, SessionState::Anonymous);
    assert_eq!(backend.count(&Method::POST, "/users/refresh"), 0);
}

#[tokio::test]
async fn test_wrong_password_leaves_session_unchanged() {
    let backend = FakeBackend::start().await;
    backend.seed_user("ivan", DEFAULT_PASSWORD, false);
    let storefront = backend.storefront();
    storefront.start().await;

    let err = storefront
        .sign_in("ivan", &SecretString::from("wrong-password"))
        .await
        .expect_err("bad password");

    assert!(err.is_invalid_credentials());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(!storefront.client().has_credentials());
    assert_eq!(backend.count(&Method::POST, "/users/refresh"), 0);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_signs_in_new_user() {
    let backend = FakeBackend::start().await;
    let storefront = backend.storefront();

    let user = storefront
        .register(new_user("marina", "secret1"))
        .await
        .expect("register");

    assert_eq!(user.login, "marina");
    assert!(storefront.session().state().is_authenticated());
    assert!(storefront.cart().is_empty());
}

#[tokio::test]
async fn test_register_validates_before_any_request() {
    let backend = FakeBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront
        .register(new_user("ab", "secret1"))
        .await
        .expect_err("short login");
    assert!(matches!(err, SessionError::FieldLength { field: "login", .. }));

    let err = storefront
        .register(new_user("marina", "12345"))
        .await
        .expect_err("short password");
    assert!(matches!(err, SessionError::WeakPassword { min: 6 }));

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_register_with_taken_login_fails() {
    let backend = FakeBackend::start().await;
    backend.seed_user("marina", DEFAULT_PASSWORD, false);
    let storefront = backend.storefront();

    let err = storefront
        .register(new_user("marina", "secret1"))
        .await
        .expect_err("duplicate login");
    assert!(matches!(err, SessionError::Api(_)));
    assert!(!storefront.session().state().is_authenticated());
}

// ============================================================================
// Sign-out
// ============================================================================

#[tokio::test]
async fn test_sign_out_clears_session_and_cart() {
    let backend = FakeBackend::start().await;
    let tea = backend.seed_product("Tea", Price::from_minor(35_000), 10);
    let (storefront, user) = backend.customer("ivan").await;
    storefront.cart().add(tea.id, 1).await.expect("add");

    storefront.sign_out().await;

    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(!storefront.client().has_credentials());
    assert!(storefront.cart().is_empty());
    assert_eq!(backend.count(&Method::POST, "/users/logout"), 1);
    // The server-side cart survives sign-out.
    assert_eq!(backend.cart_of(user.id).len(), 1);
}

#[tokio::test]
async fn test_sign_out_succeeds_locally_when_backend_is_down() {
    let storefront = offline_storefront().await;
    storefront
        .client()
        .set_access_token(SecretString::from("tok-stale"));
    storefront.session().login(User {
        id: UserId::new(4),
        login: "ivan".to_string(),
        username: "Ivan".to_string(),
        email: "ivan@example.com".to_string(),
        is_admin: false,
    });

    storefront.sign_out().await;

    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(!storefront.client().has_credentials());
}

// ============================================================================
// Identity Updates
// ============================================================================

#[tokio::test]
async fn test_identity_patch_is_reconciled_with_server() {
    let backend = FakeBackend::start().await;
    let (storefront, user) = backend.customer("ivan").await;
    backend.set_username(user.id, "Ivan Petrov");

    let reconcile = storefront
        .session()
        .update_identity(&UserPatch {
            username: Some("Ivan P.".to_string()),
            email: None,
        })
        .expect("signed in");
    assert_eq!(
        storefront.session().user().map(|u| u.username),
        Some("Ivan P.".to_string())
    );

    reconcile.await.expect("reconciliation task panicked");
    assert_eq!(
        storefront.session().user().map(|u| u.username),
        Some("Ivan Petrov".to_string())
    );
}

#[tokio::test]
async fn test_identity_patch_requires_session() {
    let backend = FakeBackend::start().await;
    let storefront = backend.storefront();
    storefront.start().await;

    let err = storefront
        .session()
        .update_identity(&UserPatch::default())
        .expect_err("anonymous patch");
    assert!(matches!(err, SessionError::NotAuthenticated));
}

#[tokio::test]
async fn test_change_username_replaces_local_identity() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;

    let user = storefront
        .session()
        .change_username("  Ivan the Buyer ")
        .await
        .expect("rename");
    assert_eq!(user.username, "Ivan the Buyer");
    assert_eq!(storefront.session().user(), Some(user));
}

#[tokio::test]
async fn test_change_password_checks_current_password() {
    let backend = FakeBackend::start().await;
    let (storefront, _) = backend.customer("ivan").await;

    let err = storefront
        .session()
        .change_password(&SecretString::from("nope-nope"), &SecretString::from("better1"))
        .await
        .expect_err("wrong current password");
    assert!(matches!(err, SessionError::Api(_)));

    storefront
        .session()
        .change_password(&SecretString::from(DEFAULT_PASSWORD), &SecretString::from("better1"))
        .await
        .expect("change password");

    let again = backend.storefront();
    again
        .sign_in("ivan", &SecretString::from("better1"))
        .await
        .expect("sign in with new password");
}
