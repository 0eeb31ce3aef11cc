//! Cart error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Cart actions need a signed-in user.
    #[error("sign in to use the cart")]
    NotAuthenticated,

    /// Quantities start at one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The cart was reset while the operation was in flight; its result was
    /// not applied.
    #[error("cart was reset while the operation was in flight")]
    Discarded,

    /// API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CartError {
    /// The underlying API error, if any.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            _ => None,
        }
    }
}
