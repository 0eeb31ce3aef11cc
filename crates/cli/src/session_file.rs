//! Access token persistence between invocations.
//!
//! The token is written as JSON to `BAZAAR_SESSION_FILE`
//! (default `.bazaar-session.json`).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SESSION_FILE: &str = ".bazaar-session.json";

/// Errors reading or writing the session file.
#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("Session file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Stored {
    access_token: String,
}

/// Location of the persisted session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Session file from `BAZAAR_SESSION_FILE` or the default path.
    #[must_use]
    pub fn from_env() -> Self {
        let path = std::env::var("BAZAAR_SESSION_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string());
        Self::new(path)
    }

    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored token, or `None` if there is no session file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<SecretString>, SessionFileError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: Stored = serde_json::from_str(&raw)?;
        Ok(Some(SecretString::from(stored.access_token)))
    }

    /// Persist `token`, or delete the file when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or removed.
    pub fn store(&self, token: Option<&SecretString>) -> Result<(), SessionFileError> {
        match token {
            Some(token) => {
                let json = serde_json::to_string(&Stored {
                    access_token: token.expose_secret().to_string(),
                })?;
                std::fs::write(&self.path, json)?;
            }
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_no_session() {
        let tmp = TempDir::new().unwrap();
        let file = SessionFile::new(tmp.path().join("session.json"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_store_load_and_clear() {
        let tmp = TempDir::new().unwrap();
        let file = SessionFile::new(tmp.path().join("session.json"));

        file.store(Some(&SecretString::from("tok-1"))).unwrap();
        assert_eq!(file.load().unwrap().unwrap().expose_secret(), "tok-1");

        file.store(None).unwrap();
        assert!(!file.path().exists());
        // Clearing twice is fine.
        file.store(None).unwrap();
    }

    #[test]
    fn test_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = SessionFile::new(path).load().unwrap_err();
        assert!(matches!(err, SessionFileError::Corrupt(_)));
    }
}
