//! Application context shared by all views.

use std::sync::{Arc, Weak};

use secrecy::SecretString;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::cart::CartStore;
use crate::checkout::Checkout;
use crate::config::StorefrontConfig;
use crate::models::{NewUser, User};
use crate::session::{SessionError, SessionState, SessionStore};

/// The storefront: API client, session, cart and checkout wired together.
///
/// This struct is cheaply cloneable via `Arc`; every clone sees the same
/// stores.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    client: ApiClient,
    session: SessionStore,
    cart: CartStore,
    checkout: Checkout,
}

impl Storefront {
    /// Create the storefront context.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ApiError> {
        let client = ApiClient::new(&config)?;
        let session = SessionStore::new(client.clone());
        let cart = CartStore::new(
            client.clone(),
            session.clone(),
            config.cart_fetch_concurrency,
        );
        let checkout = Checkout::new(client.clone(), cart.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<StorefrontInner>| {
            // Weak: `inner` owns the client that owns this hook.
            let weak = weak.clone();
            client.on_invalidated(move || {
                if let Some(inner) = weak.upgrade() {
                    info!("Session invalidated, resetting session and cart");
                    inner.cart.reset();
                    inner.session.force_anonymous();
                }
            });

            StorefrontInner {
                config,
                client,
                session,
                cart,
                checkout,
            }
        });

        Ok(Self { inner })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the API client.
    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Get a reference to the session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    /// Get a reference to the checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    /// Resolve the session and, when signed in, load the cart.
    ///
    /// A cart that fails to load is logged and left empty; the session
    /// outcome is returned either way.
    pub async fn start(&self) -> SessionState {
        let state = self.inner.session.init().await;
        if state.is_authenticated() {
            self.load_cart().await;
        }
        state
    }

    /// Sign in and load the cart.
    ///
    /// # Errors
    ///
    /// Returns the session error; the cart is only loaded on success.
    pub async fn sign_in(&self, login: &str, password: &SecretString) -> Result<User, SessionError> {
        let user = self.inner.session.sign_in(login, password).await?;
        self.load_cart().await;
        Ok(user)
    }

    /// Register, sign in and load the (empty) cart.
    ///
    /// # Errors
    ///
    /// Returns the session error.
    pub async fn register(&self, user: NewUser) -> Result<User, SessionError> {
        let user = self.inner.session.register(user).await?;
        self.load_cart().await;
        Ok(user)
    }

    /// Sign out and forget the cart. Always ends `Anonymous`.
    pub async fn sign_out(&self) {
        self.inner.cart.reset();
        self.inner.session.logout().await;
    }

    async fn load_cart(&self) {
        if let Err(error) = self.inner.cart.load().await {
            warn!(error = %error, "Failed to load cart");
        }
    }
}
