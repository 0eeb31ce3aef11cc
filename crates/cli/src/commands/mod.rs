//! Command implementations.
//!
//! Commands write their results to stdout; logs go to stderr.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod orders;

use std::io::{BufRead, Write};

use bazaar_core::EmailError;
use bazaar_storefront::api::ApiError;
use bazaar_storefront::cart::CartError;
use bazaar_storefront::checkout::CheckoutError;
use bazaar_storefront::models::User;
use bazaar_storefront::session::SessionError;
use bazaar_storefront::{Storefront, StorefrontConfig};
use secrecy::SecretString;
use thiserror::Error;

use crate::session_file::{SessionFile, SessionFileError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    SessionFile(#[from] SessionFileError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not signed in. Run `bazaar login` first.")]
    NotSignedIn,

    #[error("Admin rights required")]
    NotAdmin,
}

/// Everything a command needs: the storefront and the session file.
pub struct Context {
    storefront: Storefront,
    session_file: SessionFile,
}

impl Context {
    /// Build the storefront and restore the saved session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the session
    /// file is unreadable.
    pub async fn open(config: StorefrontConfig) -> Result<Self, CliError> {
        let storefront = Storefront::new(config)?;
        let session_file = SessionFile::from_env();

        if let Some(token) = session_file.load()? {
            storefront.client().set_access_token(token);
            let state = storefront.start().await;
            tracing::debug!(authenticated = state.is_authenticated(), "Session restored");
        }

        Ok(Self {
            storefront,
            session_file,
        })
    }

    pub const fn storefront(&self) -> &Storefront {
        &self.storefront
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `CliError::NotSignedIn` without a session.
    pub fn require_user(&self) -> Result<User, CliError> {
        self.storefront
            .session()
            .user()
            .ok_or(CliError::NotSignedIn)
    }

    /// Write the current token to the session file (or remove it).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist_session(&self) -> Result<(), CliError> {
        self.session_file
            .store(self.storefront.client().access_token().as_ref())?;
        Ok(())
    }
}

/// Use `given` or prompt for a secret on stdin.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub fn secret_or_prompt(given: Option<String>, prompt: &str) -> Result<SecretString, CliError> {
    if let Some(value) = given {
        return Ok(SecretString::from(value));
    }

    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt}: ")?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(line.trim_end_matches(['\r', '\n']).to_string()))
}
