//! Registered-session credentials
//!
//! Stores the bearer token pair in ~/.config/vchat/credentials.json with
//! restricted permissions (0o600). Obtaining the tokens happens outside this
//! client; here they are only read, refreshed and forgotten.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use vchat_api::TokenStore;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Contents of the credentials file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Get the credentials file path
pub fn credentials_file() -> PathBuf {
    crate::config::Config::config_dir().join("credentials.json")
}

/// File-backed [`TokenStore`]
#[derive(Debug)]
pub struct CredentialsStore {
    path: PathBuf,
    credentials: Mutex<Credentials>,
}

impl CredentialsStore {
    /// Open the default credentials file
    pub fn open() -> Self {
        Self::open_at(credentials_file())
    }

    /// Open `path`; a missing or unreadable file holds no credentials
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let credentials = load(&path);
        Self {
            path,
            credentials: Mutex::new(credentials),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_access_token(&self) -> bool {
        self.credentials.lock().access_token.is_some()
    }
}

fn load(path: &Path) -> Credentials {
    if !path.exists() {
        return Credentials::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed credentials file: {}", e);
            Credentials::default()
        }),
        Err(e) => {
            tracing::warn!("Failed to read credentials file: {}", e);
            Credentials::default()
        }
    }
}

fn save(path: &Path, credentials: &Credentials) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            // Set directory permissions to 0o700 on Unix
            #[cfg(unix)]
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }

    let content = serde_json::to_string_pretty(credentials)?;
    fs::write(path, content)?;

    // Owner read/write only
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Delete the credentials file at `path`. Returns whether one existed.
pub fn remove(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl TokenStore for CredentialsStore {
    fn access_token(&self) -> Option<String> {
        self.credentials.lock().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.credentials.lock().refresh_token.clone()
    }

    fn set_access_token(&self, token: &str) -> vchat_api::Result<()> {
        let mut credentials = self.credentials.lock();
        credentials.access_token = Some(token.to_string());
        save(&self.path, &credentials).map_err(|e| vchat_api::Error::Storage(e.to_string()))
    }

    fn clear(&self) -> vchat_api::Result<()> {
        *self.credentials.lock() = Credentials::default();
        remove(&self.path)
            .map(|_| ())
            .map_err(|e| vchat_api::Error::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("vchat-creds-{}-{}", name, std::process::id()))
            .join("credentials.json")
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_file_has_no_tokens() {
        let store = CredentialsStore::open_at(temp_path("missing"));
        assert!(!store.has_access_token());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_refresh_persists_new_access_token() {
        let path = temp_path("refresh");
        write(
            &path,
            r#"{"access_token": "old", "refresh_token": "keep"}"#,
        );

        let store = CredentialsStore::open_at(&path);
        assert_eq!(store.access_token().as_deref(), Some("old"));
        store.set_access_token("new").unwrap();

        let reopened = CredentialsStore::open_at(&path);
        assert_eq!(reopened.access_token().as_deref(), Some("new"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("keep"));

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_clear_forgets_and_deletes() {
        let path = temp_path("clear");
        write(&path, r#"{"access_token": "a", "refresh_token": "r"}"#);

        let store = CredentialsStore::open_at(&path);
        store.clear().unwrap();
        assert!(store.access_token().is_none());
        assert!(!path.exists());
        // Clearing twice is fine
        store.clear().unwrap();

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let path = temp_path("malformed");
        write(&path, "not json");
        let store = CredentialsStore::open_at(&path);
        assert!(!store.has_access_token());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
