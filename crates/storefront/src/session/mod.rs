//! Session store: who is signed in.
//!
//! The state is published through a `tokio::sync::watch` channel so views can
//! await changes instead of polling:
//!
//! ```text
//! Uninitialized ──init()──▶ Loading ──▶ Authenticated(user)
//!                                  └──▶ Anonymous
//! ```
//!
//! `login`/`sign_in`/`register` force `Authenticated`; `logout` and
//! client-side invalidation force `Anonymous`.

mod error;

pub use error::SessionError;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::models::{NewUser, User, UserPatch};
use crate::telemetry;

const NAME_MIN_LENGTH: usize = 3;
const NAME_MAX_LENGTH: usize = 50;
const PASSWORD_MIN_LENGTH: usize = 6;

/// Authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// `init` has not run yet.
    #[default]
    Uninitialized,
    /// The current identity is being fetched.
    Loading,
    Authenticated(User),
    Anonymous,
}

impl SessionState {
    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Authenticated(user) if user.is_admin)
    }

    /// Whether the identity is not known yet.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Loading)
    }
}

/// Shared handle to the session state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    client: ApiClient,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(SessionStoreInner { client, state }),
        }
    }

    // =========================================================================
    // State Access
    // =========================================================================

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Cart actions need a signed-in user.
    #[must_use]
    pub fn can_use_cart(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Back-office actions need a signed-in admin.
    #[must_use]
    pub fn can_administer(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Resolve the identity behind the stored credentials.
    ///
    /// Any failure (no credentials, expired session, backend down) yields
    /// `Anonymous`; that is the normal state of a fresh visitor. A login or
    /// logout that happens while the fetch is in flight wins.
    #[instrument(skip(self))]
    pub async fn init(&self) -> SessionState {
        self.inner.state.send_replace(SessionState::Loading);

        let resolved = match self.inner.client.current_user().await {
            Ok(user) => {
                telemetry::set_sentry_user(&user);
                SessionState::Authenticated(user)
            }
            Err(error) => {
                debug!(error = %error, "No active session");
                SessionState::Anonymous
            }
        };

        self.inner.state.send_if_modified(|state| {
            if matches!(state, SessionState::Loading) {
                *state = resolved;
                true
            } else {
                false
            }
        });

        self.state()
    }

    /// Force `Authenticated(user)`. No network call.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn login(&self, user: User) {
        telemetry::set_sentry_user(&user);
        telemetry::add_breadcrumb("auth", "Signed in", None);
        info!(login = %user.login, "User signed in");
        self.inner
            .state
            .send_replace(SessionState::Authenticated(user));
    }

    /// Sign in with a login and password.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api(ApiError::AuthExpired)` for wrong
    /// credentials; other API failures propagate. The session is unchanged
    /// on error.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, login: &str, password: &SecretString) -> Result<User, SessionError> {
        let token = self.inner.client.login(login.trim(), password).await?;
        self.establish(token.access_token).await
    }

    /// Create an account and sign in with it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for short fields before any network call,
    /// or the API error (e.g. login taken).
    #[instrument(skip(self, user), fields(login = %user.login))]
    pub async fn register(&self, user: NewUser) -> Result<User, SessionError> {
        let user = validate_new_user(user)?;
        let token = self.inner.client.register(&user).await?;
        self.establish(token.access_token).await
    }

    /// Store a fresh token, fetch its identity and sign in.
    async fn establish(&self, access_token: String) -> Result<User, SessionError> {
        self.inner
            .client
            .set_access_token(SecretString::from(access_token));

        match self.inner.client.current_user().await {
            Ok(user) => {
                self.login(user.clone());
                Ok(user)
            }
            Err(error) => {
                self.inner.client.clear_credentials();
                Err(error.into())
            }
        }
    }

    /// Sign out.
    ///
    /// The server call is best effort: local state becomes `Anonymous` even
    /// if the backend cannot be reached.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(error) = self.inner.client.logout().await {
            warn!(error = %error, "Server logout failed, signing out locally");
        }
        self.inner.client.clear_credentials();
        telemetry::add_breadcrumb("auth", "Signed out", None);
        self.force_anonymous();
    }

    /// Drop the identity without a network call.
    pub fn force_anonymous(&self) {
        telemetry::clear_sentry_user();
        self.inner.state.send_replace(SessionState::Anonymous);
    }

    /// Merge `patch` into the current identity immediately, then reconcile
    /// with the server in the background.
    ///
    /// The returned handle resolves once the reconciliation fetch has been
    /// applied (or abandoned).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` when nobody is signed in.
    #[instrument(skip(self, patch))]
    pub fn update_identity(&self, patch: &UserPatch) -> Result<JoinHandle<()>, SessionError> {
        let mut user_id = None;
        self.inner.state.send_if_modified(|state| {
            if let SessionState::Authenticated(user) = state {
                user.apply(patch);
                user_id = Some(user.id);
                true
            } else {
                false
            }
        });
        let user_id = user_id.ok_or(SessionError::NotAuthenticated)?;

        let store = self.clone();
        Ok(tokio::spawn(async move {
            match store.inner.client.current_user().await {
                Ok(fresh) => {
                    let applied = store.inner.state.send_if_modified(|state| match state {
                        SessionState::Authenticated(user) if user.id == user_id => {
                            let changed = *user != fresh;
                            *user = fresh;
                            changed
                        }
                        _ => false,
                    });
                    debug!(changed = applied, "Identity reconciled with server");
                }
                Err(error) => {
                    warn!(error = %error, "Identity reconciliation failed, keeping local copy");
                }
            }
        }))
    }

    /// Change the signed-in user's display name. The server's answer
    /// replaces the local identity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` when nobody is signed in, a
    /// length error for invalid names, or the API error.
    #[instrument(skip(self))]
    pub async fn change_username(&self, new_username: &str) -> Result<User, SessionError> {
        let current = self.user().ok_or(SessionError::NotAuthenticated)?;
        let new_username = new_username.trim();
        check_length("username", new_username)?;

        let updated = self
            .inner
            .client
            .update_username(current.id, new_username)
            .await?;

        self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated(user) if user.id == updated.id => {
                *user = updated.clone();
                true
            }
            _ => false,
        });
        Ok(updated)
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` when nobody is signed in,
    /// `SessionError::WeakPassword` for a short new password, or the API
    /// error (e.g. wrong current password).
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), SessionError> {
        let user = self.user().ok_or(SessionError::NotAuthenticated)?;
        check_password(new)?;
        self.inner
            .client
            .update_password(user.id, current, new)
            .await?;
        telemetry::add_breadcrumb("auth", "Password changed", None);
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_new_user(mut user: NewUser) -> Result<NewUser, SessionError> {
    user.login = user.login.trim().to_string();
    user.username = user.username.trim().to_string();
    check_length("login", &user.login)?;
    check_length("username", &user.username)?;
    check_password(&user.password)?;
    Ok(user)
}

fn check_length(field: &'static str, value: &str) -> Result<(), SessionError> {
    let len = value.chars().count();
    if (NAME_MIN_LENGTH..=NAME_MAX_LENGTH).contains(&len) {
        Ok(())
    } else {
        Err(SessionError::FieldLength {
            field,
            min: NAME_MIN_LENGTH,
            max: NAME_MAX_LENGTH,
        })
    }
}

fn check_password(password: &SecretString) -> Result<(), SessionError> {
    if password.expose_secret().chars().count() < PASSWORD_MIN_LENGTH {
        return Err(SessionError::WeakPassword {
            min: PASSWORD_MIN_LENGTH,
        });
    }
    Ok(())
}
