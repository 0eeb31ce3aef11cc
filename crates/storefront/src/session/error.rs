//! Session error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A login or display name outside the allowed length.
    #[error("{field} must be between {min} and {max} characters")]
    FieldLength {
        field: &'static str,
        min: usize,
        max: usize,
    },

    /// Password shorter than the minimum length.
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotAuthenticated,

    /// API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    /// Whether the backend rejected the login or password.
    #[must_use]
    pub const fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::Api(ApiError::AuthExpired(_)))
    }
}
