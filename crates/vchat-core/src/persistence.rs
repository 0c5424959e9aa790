//! Write-through mirror of a guest transcript into session-scoped storage

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use vchat_api::Message;

use crate::store::StoreObserver;

/// The single key holding the serialized guest transcript
pub const STORAGE_KEY: &str = "guest_chat_messages";

/// A rehydrated transcript
pub type Transcript = Vec<Message>;

/// Why a stored transcript was rejected
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("stored transcript is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored transcript is not an array")]
    NotAnArray,
}

/// Key/value storage that lives as long as the session
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> crate::Result<()>;
    fn remove(&self, key: &str);
}

/// Process-lifetime storage
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read session entry {}: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove session entry {}: {}", key, e),
        }
    }
}

/// Mirrors a message store into [`SessionStorage`] under [`STORAGE_KEY`].
#[derive(Clone)]
pub struct PersistenceBridge {
    storage: Arc<dyn SessionStorage>,
}

impl PersistenceBridge {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Decode the stored transcript. A missing key is an empty transcript.
    pub fn load(&self) -> Result<Transcript, DecodeError> {
        let Some(raw) = self.storage.get(STORAGE_KEY) else {
            return Ok(Vec::new());
        };

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        if !value.is_array() {
            return Err(DecodeError::NotAnArray);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Load the stored transcript, discarding it if it cannot be decoded.
    pub fn restore(&self) -> Transcript {
        match self.load() {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Discarding stored transcript: {}", e);
                self.storage.remove(STORAGE_KEY);
                Vec::new()
            }
        }
    }

    /// Overwrite the stored transcript with `messages`; empty removes the key.
    pub fn save(&self, messages: &[Message]) {
        if messages.is_empty() {
            self.storage.remove(STORAGE_KEY);
            return;
        }

        let written = match serde_json::to_string(messages) {
            Ok(json) => self.storage.set(STORAGE_KEY, &json).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = written {
            tracing::warn!("Failed to persist transcript, clearing it: {}", e);
            self.storage.remove(STORAGE_KEY);
        }
    }

    pub fn clear(&self) {
        self.storage.remove(STORAGE_KEY);
    }

    /// Store observer that saves on every mutation
    pub fn observer(&self) -> Box<dyn StoreObserver> {
        Box::new(self.clone())
    }
}

impl StoreObserver for PersistenceBridge {
    fn on_change(&mut self, messages: &[Message]) {
        self.save(messages);
    }
}
