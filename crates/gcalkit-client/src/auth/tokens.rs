//! Persistence of the durable credential.
//!
//! Only the refresh token is written to disk, together with the granted
//! scopes and the time of the last exchange.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gcalkit_core::{CalendarError, CalendarResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credential::Credential;

/// What is kept on disk between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub refresh_token: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

impl StoredToken {
    /// Returns true if the stored grant covers every required scope.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }
}

/// File-backed refresh token storage.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token, or `None` if nothing was saved yet.
    pub fn load(&self) -> CalendarResult<Option<StoredToken>> {
        if !self.path.exists() {
            debug!("no token file at {:?}", self.path);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            CalendarError::configuration(format!("failed to read token file: {}", e))
                .with_source(e)
        })?;

        let token: StoredToken = serde_json::from_str(&content).map_err(|e| {
            CalendarError::configuration(format!("failed to parse token file: {}", e))
                .with_source(e)
        })?;

        info!("loaded refresh token from {:?}", self.path);
        Ok(Some(token))
    }

    /// Writes the token atomically through a temp file.
    pub fn save(&self, token: &StoredToken) -> CalendarResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CalendarError::configuration(format!("failed to create token directory: {}", e))
                    .with_source(e)
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(token).map_err(|e| {
            CalendarError::configuration(format!("failed to serialize tokens: {}", e))
                .with_source(e)
        })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path).map_err(|e| {
            CalendarError::configuration(format!("failed to create token file: {}", e))
                .with_source(e)
        })?;

        // `mode` only applies to new files; a leftover temp file keeps its own.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| {
                    CalendarError::configuration(format!(
                        "failed to restrict token file permissions: {}",
                        e
                    ))
                    .with_source(e)
                })?;
        }

        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                CalendarError::configuration(format!("failed to write token file: {}", e))
                    .with_source(e)
            })?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            CalendarError::configuration(format!("failed to rename token file: {}", e))
                .with_source(e)
        })?;

        debug!("saved refresh token to {:?}", self.path);
        Ok(())
    }

    /// Persists the durable part of `credential`.
    ///
    /// Returns false when the credential holds no refresh token yet.
    pub fn store_credential(&self, credential: &Credential) -> CalendarResult<bool> {
        let Some(refresh_token) = credential.refresh_token() else {
            return Ok(false);
        };
        self.save(&StoredToken {
            refresh_token: refresh_token.to_string(),
            scopes: credential.scopes().to_vec(),
            last_refresh: Utc::now(),
        })?;
        Ok(true)
    }

    /// Removes the token file.
    pub fn clear(&self) -> CalendarResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                CalendarError::configuration(format!("failed to remove token file: {}", e))
                    .with_source(e)
            })?;
            info!("cleared tokens from {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::TokenGrant;
    use crate::config::OAuthCredentials;

    fn exchanged_credential() -> Credential {
        let mut cred = Credential::new(&OAuthCredentials::new(
            "id.apps.googleusercontent.com",
            "secret",
            "http://localhost",
        ));
        cred.apply_grant(TokenGrant {
            access_token: "ya29.short-lived".into(),
            refresh_token: Some("1//durable".into()),
            expires_in: Some(3600),
            scope: Some("https://www.googleapis.com/auth/calendar".into()),
            token_type: None,
        });
        cred
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn stores_refresh_token_but_not_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");
        let storage = TokenStorage::new(&path);

        assert!(storage.store_credential(&exchanged_credential()).unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("1//durable"));
        assert!(!content.contains("ya29"));

        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "1//durable");
        assert!(loaded.has_scopes(&["https://www.googleapis.com/auth/calendar".to_string()]));
        assert!(!loaded.has_scopes(&["other".to_string()]));
    }

    #[test]
    fn credential_without_refresh_token_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        let cred = Credential::new(&OAuthCredentials::new("a", "b", "c"));
        assert!(!storage.store_credential(&cred).unwrap());
        assert!(!storage.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        storage.store_credential(&exchanged_credential()).unwrap();
        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn leftover_readable_temp_file_is_restricted() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, "stale").unwrap();
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o644)).unwrap();

        let storage = TokenStorage::new(&path);
        storage.store_credential(&exchanged_credential()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!temp_path.exists());
        assert_eq!(storage.load().unwrap().unwrap().refresh_token, "1//durable");
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        storage.store_credential(&exchanged_credential()).unwrap();
        storage.clear().unwrap();
        assert!(!storage.path().exists());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "{not json").unwrap();
        let err = TokenStorage::new(path).load().unwrap_err();
        assert_eq!(err.kind(), gcalkit_core::ErrorKind::Configuration);
    }
}
