//! Bearer credentials for registered sessions
//!
//! Obtaining tokens (login) happens elsewhere; this module only reads them,
//! replaces the access token after a refresh, and forgets them when the
//! refresh token is rejected.

use parking_lot::Mutex;
use serde::Deserialize;

/// Storage for the access/refresh token pair
pub trait TokenStore: Send + Sync {
    /// Current access token
    fn access_token(&self) -> Option<String>;

    /// Current refresh token
    fn refresh_token(&self) -> Option<String>;

    /// Replace the access token after a successful refresh
    fn set_access_token(&self, token: &str) -> crate::Result<()>;

    /// Forget all stored credentials
    fn clear(&self) -> crate::Result<()>;
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Tokens>,
}

#[derive(Debug, Default, Clone)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

impl MemoryTokenStore {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            tokens: Mutex::new(Tokens {
                access: Some(access.into()),
                refresh,
            }),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.lock().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.lock().refresh.clone()
    }

    fn set_access_token(&self, token: &str) -> crate::Result<()> {
        self.tokens.lock().access = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> crate::Result<()> {
        *self.tokens.lock() = Tokens::default();
        Ok(())
    }
}

/// Body of a successful `/auth/refresh` answer
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub data: RefreshData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshData {
    pub access_token: String,
}

/// Format a bearer header value
pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
