//! vchat-core: conversation runtime
//!
//! This crate owns the client-local transcript, mirrors it into session
//! storage for guest sessions, and orchestrates one send-message transaction
//! at a time against a [`vchat_api::ChatBackend`].

pub mod controller;
pub mod error;
pub mod events;
pub mod handle;
pub mod notify;
pub mod persistence;
pub mod store;

pub use controller::{ConversationController, PRE_STREAM_APOLOGY, STREAM_APOLOGY, SendOutcome};
pub use error::{Error, Result};
pub use events::ConversationEvent;
pub use handle::SendHandle;
pub use notify::{BufferedNotifier, Notice, NoticeLevel, Notifier, NullNotifier};
pub use persistence::{
    DecodeError, FileSessionStorage, MemorySessionStorage, PersistenceBridge, STORAGE_KEY,
    SessionStorage, Transcript,
};
pub use store::{MessageStore, PatchView, SharedStore, StoreObserver};
