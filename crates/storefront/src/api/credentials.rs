//! Session credential holder.
//!
//! The backend authenticates with an `access_token` cookie whose value is
//! `Bearer <token>`. The token never leaves this module unredacted except
//! through [`Credentials::cookie_header`] and [`Credentials::token`].

use std::sync::{Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Current access token plus a generation counter.
///
/// The generation is bumped on every change so that a request which observed
/// generation `n` can tell whether someone else already refreshed.
#[derive(Default)]
pub(crate) struct Credentials {
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    token: Option<SecretString>,
}

/// Point-in-time view of the credentials.
pub(crate) struct Snapshot {
    pub generation: u64,
    pub cookie: Option<String>,
}

impl Credentials {
    pub fn snapshot(&self) -> Snapshot {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            generation: slot.generation,
            cookie: slot.token.as_ref().map(Self::cookie_header),
        }
    }

    pub fn generation(&self) -> u64 {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn is_present(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .is_some()
    }

    pub fn token(&self) -> Option<SecretString> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    /// Store `token`. Re-storing the current token is not a change and keeps
    /// the generation.
    pub fn set(&self, token: SecretString) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .token
            .as_ref()
            .is_some_and(|current| current.expose_secret() == token.expose_secret())
        {
            return;
        }
        slot.generation += 1;
        slot.token = Some(token);
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        slot.token = None;
    }

    /// Clear the token only if it is still the one from generation `seen`.
    ///
    /// Returns the new generation, or `None` when the credentials changed in
    /// the meantime and were left alone.
    pub fn clear_if_current(&self, seen: u64) -> Option<u64> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != seen {
            return None;
        }
        slot.generation += 1;
        slot.token = None;
        Some(slot.generation)
    }

    fn cookie_header(token: &SecretString) -> String {
        format!("{ACCESS_TOKEN_COOKIE}=Bearer {}", token.expose_secret())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Credentials")
            .field("generation", &slot.generation)
            .field("token", &slot.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// What a `Set-Cookie` header means for the access token.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CookieUpdate {
    Set(String),
    Cleared,
}

/// Interpret a `Set-Cookie` header value.
///
/// Returns `None` for unrelated cookies. The value may be quoted and may carry
/// the `Bearer ` scheme prefix; an empty value means the server deleted it.
pub(crate) fn parse_set_cookie(header: &str) -> Option<CookieUpdate> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.trim() != ACCESS_TOKEN_COOKIE {
        return None;
    }

    let value = value.trim().trim_matches('"');
    let value = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    if value.is_empty() {
        Some(CookieUpdate::Cleared)
    } else {
        Some(CookieUpdate::Set(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_bumps_on_change() {
        let credentials = Credentials::default();
        assert_eq!(credentials.generation(), 0);
        assert!(!credentials.is_present());

        credentials.set(SecretString::from("abc"));
        assert_eq!(credentials.generation(), 1);
        assert_eq!(
            credentials.snapshot().cookie.as_deref(),
            Some("access_token=Bearer abc")
        );

        credentials.set(SecretString::from("abc"));
        assert_eq!(credentials.generation(), 1);

        credentials.clear();
        assert_eq!(credentials.generation(), 2);
        assert!(credentials.snapshot().cookie.is_none());
    }

    #[test]
    fn test_clear_if_current_keeps_newer_token() {
        let credentials = Credentials::default();
        credentials.set(SecretString::from("old"));
        let seen = credentials.generation();
        credentials.set(SecretString::from("new"));

        assert_eq!(credentials.clear_if_current(seen), None);
        assert!(credentials.is_present());

        let current = credentials.generation();
        assert_eq!(credentials.clear_if_current(current), Some(current + 1));
        assert!(!credentials.is_present());
    }

    #[test]
    fn test_debug_redacts_token() {
        let credentials = Credentials::default();
        credentials.set(SecretString::from("super-secret"));
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie(r#"access_token="Bearer xyz"; HttpOnly; Max-Age=1800; Path=/"#),
            Some(CookieUpdate::Set("xyz".to_string()))
        );
        assert_eq!(
            parse_set_cookie("access_token=plain; Path=/"),
            Some(CookieUpdate::Set("plain".to_string()))
        );
        assert_eq!(
            parse_set_cookie(r#"access_token=""; expires=Thu, 01 Jan 1970 00:00:00 GMT"#),
            Some(CookieUpdate::Cleared)
        );
        assert_eq!(parse_set_cookie("session=abc; Path=/"), None);
    }
}
