//! User and credential models.

use bazaar_core::{Email, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

/// The authenticated identity as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique login name used to sign in.
    pub login: String,
    /// Display name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Whether the user may use the back-office.
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Apply a local patch, leaving unset fields untouched.
    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(username) = &patch.username {
            self.username.clone_from(username);
        }
        if let Some(email) = &patch.email {
            self.email.clone_from(email);
        }
    }
}

/// A partial identity update applied locally before reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Registration payload for `POST /users/register`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub login: String,
    pub username: String,
    pub email: Email,
    #[serde(serialize_with = "serialize_secret")]
    pub password: SecretString,
}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Token issued by register, login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Admin role change for `PUT /admin/users/{id}/role`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoleUpdate {
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UsernameUpdate<'a> {
    pub new_username: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PasswordUpdate<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId::new(1),
            login: "ivan".to_string(),
            username: "Ivan".to_string(),
            email: "ivan@example.com".to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn test_apply_patch_only_touches_set_fields() {
        let mut u = user();
        u.apply(&UserPatch {
            username: Some("Ivan P.".to_string()),
            email: None,
        });
        assert_eq!(u.username, "Ivan P.");
        assert_eq!(u.email, "ivan@example.com");
        assert_eq!(u.login, "ivan");
    }

    #[test]
    fn test_user_deserializes_without_admin_flag() {
        let u: User = serde_json::from_str(
            r#"{"id": 3, "login": "olga", "username": "Olga", "email": "o@example.com"}"#,
        )
        .unwrap();
        assert!(!u.is_admin);
    }

    fn new_user() -> NewUser {
        NewUser {
            login: "ivan".to_string(),
            username: "Ivan".to_string(),
            email: Email::parse("ivan@example.com").unwrap(),
            password: SecretString::from("hunter22-secret"),
        }
    }

    #[test]
    fn test_new_user_debug_hides_password() {
        let debug = format!("{:?}", new_user());
        assert!(!debug.contains("hunter22-secret"));
        assert!(debug.contains("ivan"));
    }

    #[test]
    fn test_new_user_serializes_password_for_backend() {
        let json = serde_json::to_value(new_user()).unwrap();
        assert_eq!(json["password"], "hunter22-secret");
        assert_eq!(json["email"], "ivan@example.com");
    }

    #[test]
    fn test_token_defaults_type() {
        let t: Token = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(t.token_type, "bearer");
    }
}
