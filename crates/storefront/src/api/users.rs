//! Account endpoints: registration, login, profile.

use bazaar_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use super::{ApiClient, ApiError, ApiRequest};
use crate::models::user::{PasswordUpdate, UsernameUpdate};
use crate::models::{NewUser, Token, User};

impl ApiClient {
    /// Create an account. Returns the token for the new session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the login or email is taken.
    #[instrument(skip(self, user), fields(login = %user.login))]
    pub async fn register(&self, user: &NewUser) -> Result<Token, ApiError> {
        let request = ApiRequest::post("users/register")
            .json(user)?
            .skip_auth_refresh();
        self.send(request).await?.json()
    }

    /// Exchange a login and password for a token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthExpired` for wrong credentials.
    #[instrument(skip(self, password), fields(login = %login))]
    pub async fn login(&self, login: &str, password: &SecretString) -> Result<Token, ApiError> {
        let request = ApiRequest::post("users/login")
            .form(&[("username", login), ("password", password.expose_secret())])
            .skip_auth_refresh();
        self.send(request).await?.json()
    }

    /// End the server-side session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; callers forget local
    /// credentials regardless.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send(ApiRequest::post("users/logout").skip_auth_refresh())
            .await?;
        Ok(())
    }

    /// Identity behind the current credentials.
    ///
    /// # Errors
    ///
    /// Returns an auth error when there is no valid session.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("users/me").await
    }

    /// Change a user's display name.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` when changing another user's name
    /// without admin rights.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn update_username(
        &self,
        user_id: UserId,
        new_username: &str,
    ) -> Result<User, ApiError> {
        let request = ApiRequest::put(format!("users/{user_id}/username"))
            .json(&UsernameUpdate { new_username })?;
        self.send(request).await?.json()
    }

    /// Change a user's password.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the current password is wrong.
    #[instrument(skip(self, current, new), fields(user_id = %user_id))]
    pub async fn update_password(
        &self,
        user_id: UserId,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<User, ApiError> {
        let request = ApiRequest::put(format!("users/{user_id}/password")).json(&PasswordUpdate {
            current_password: current.expose_secret(),
            new_password: new.expose_secret(),
        })?;
        self.send(request).await?.json()
    }
}
