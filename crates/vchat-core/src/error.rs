//! Error types for vchat-core

use thiserror::Error;

use crate::persistence::DecodeError;

/// Result type alias using vchat-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend client layer
    #[error(transparent)]
    Api(#[from] vchat_api::Error),

    /// A send was issued while another one is still streaming
    #[error("A message is already being answered")]
    SendInFlight,

    /// The operation needs a signed-in session
    #[error("This operation requires a signed-in session")]
    NotRegistered,

    /// Stored transcript could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Session storage I/O failed
    #[error("Session storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the session's credentials are gone and the user must log in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Api(vchat_api::Error::SessionExpired))
    }
}
