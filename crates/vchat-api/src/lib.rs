//! vchat-api: client side of the chat backend
//!
//! Wire types, the incremental stream frame decoder, the stream consumer and
//! the HTTP transport used by guest and registered sessions.

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod frame;
pub mod retry;
pub mod stream;
pub mod types;

pub use auth::{MemoryTokenStore, TokenStore};
pub use client::{ByteStream, ChatBackend, HttpBackend, SessionMode};
pub use error::{Error, Result};
pub use frame::FrameDecoder;
pub use retry::RetryConfig;
pub use stream::{StreamConsumer, StreamEvent, StreamHandler, StreamState};
pub use types::*;
