//! Send orchestration: one user turn in, one streamed assistant turn out.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use vchat_api::{
    ChatBackend, ChunkPayload, ConversationId, Message, MessageId, SendRequest, SendResponse,
    SessionMode, StreamConsumer, StreamHandler, StreamState, WireTurn,
};

use crate::{
    error::{Error, Result},
    events::ConversationEvent,
    handle::SendHandle,
    notify::{Notice, NoticeLevel, Notifier},
    persistence::PersistenceBridge,
    store::{MessageStore, SharedStore},
};

/// Content of the assistant message appended when no stream could be opened
pub const PRE_STREAM_APOLOGY: &str = "Xin lỗi, đã có lỗi xảy ra.";

/// Placeholder content when a stream fails before its first chunk
pub const STREAM_APOLOGY: &str = "Xin lỗi, luồng phản hồi bị gián đoạn.";

/// How a call to [`ConversationController::send`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was blank; nothing changed
    Blank,
    /// No stream handle was obtained; an apology message was appended
    Rejected { message_id: MessageId },
    /// A stream was opened and reached `state`
    Streamed {
        message_id: MessageId,
        state: StreamState,
    },
    /// Abandoned before a stream was opened
    Cancelled,
}

/// Drives send-message transactions against one transcript.
///
/// Cloning is cheap; clones share the transcript and the in-flight slot.
#[derive(Clone)]
pub struct ConversationController {
    backend: Arc<dyn ChatBackend>,
    consumer: StreamConsumer,
    store: SharedStore,
    persistence: Option<PersistenceBridge>,
    notifier: Arc<dyn Notifier>,
    handle: SendHandle,
    conversation_id: Arc<Mutex<Option<ConversationId>>>,
    event_tx: broadcast::Sender<ConversationEvent>,
}

impl ConversationController {
    pub fn new(backend: Arc<dyn ChatBackend>, notifier: Arc<dyn Notifier>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            consumer: StreamConsumer::new(Arc::clone(&backend)),
            backend,
            store: MessageStore::new().shared(),
            persistence: None,
            notifier,
            handle: SendHandle::new(),
            conversation_id: Arc::new(Mutex::new(None)),
            event_tx,
        }
    }

    /// Rehydrate the transcript from `bridge` and mirror every later change
    /// into it. Only guest sessions are persisted.
    pub fn with_persistence(mut self, bridge: PersistenceBridge) -> Self {
        if self.backend.mode() == SessionMode::Registered {
            tracing::debug!("Registered sessions are not persisted locally");
            return self;
        }

        let restored = bridge.restore();
        tracing::debug!("Restored {} messages from session storage", restored.len());
        {
            let mut store = self.store.lock();
            store.replace_all(restored);
            store.observe(bridge.observer());
        }
        self.persistence = Some(bridge);
        self
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Snapshot of the transcript
    pub fn messages(&self) -> Vec<Message> {
        self.store.lock().messages().to_vec()
    }

    pub fn mode(&self) -> SessionMode {
        self.backend.mode()
    }

    /// Server conversation this session continues, if any
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id.lock().clone()
    }

    /// Handle for cancelling or awaiting the in-flight send
    pub fn handle(&self) -> SendHandle {
        self.handle.clone()
    }

    /// Whether a send is in flight
    pub fn is_streaming(&self) -> bool {
        self.handle.is_streaming()
    }

    /// Abandon the in-flight send. Its placeholder keeps what it received.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Submit `text` as a new user turn and stream the answer into the
    /// transcript.
    ///
    /// Backend and stream failures become transcript content, not errors.
    /// `Err` is returned only when another send is still in flight.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Blank);
        }

        let Some(guard) = self.handle.try_begin() else {
            tracing::warn!("Rejecting send while another message is being answered");
            return Err(Error::SendInFlight);
        };
        let cancel = guard.token().clone();

        let user = Message::user(text);
        let request = {
            let mut store = self.store.lock();
            // A reset may have landed between claiming the slot and here
            if cancel.is_cancelled() {
                return Ok(SendOutcome::Cancelled);
            }
            let mut history: Vec<WireTurn> = store
                .messages()
                .iter()
                .filter(|m| m.is_meaningful_history())
                .map(Message::to_wire)
                .collect();
            history.push(user.to_wire());
            store.append(user.clone());
            SendRequest {
                messages: history,
                conversation_id: self.conversation_id(),
            }
        };
        self.emit(ConversationEvent::UserMessage { message: user });

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SendOutcome::Cancelled),
            sent = self.backend.send_message(&request) => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => return Ok(self.reject(e, &cancel)),
        };
        self.adopt_conversation(&response);

        let message_id = MessageId::placeholder_for(&response.stream_id);
        if !self.append_unless_cancelled(Message::placeholder(message_id.clone()), &cancel) {
            return Ok(SendOutcome::Cancelled);
        }
        self.emit(ConversationEvent::AssistantStarted {
            message_id: message_id.clone(),
            stream_id: response.stream_id.clone(),
        });

        let mut writer = PlaceholderWriter {
            store: Arc::clone(&self.store),
            message_id: message_id.clone(),
            events: self.event_tx.clone(),
            received: false,
        };
        let state = self
            .consumer
            .open(&response.stream_id, &mut writer, cancel)
            .await;

        if state == StreamState::Cancelled {
            self.store.lock().patch(&message_id, |m| *m.thinking = false);
        }

        drop(guard);
        Ok(SendOutcome::Streamed { message_id, state })
    }

    /// Start over: cancel the in-flight send and clear the transcript.
    pub fn new_chat(&self) {
        self.handle.abort();
        self.store.lock().reset();
        if let Some(bridge) = &self.persistence {
            bridge.clear();
        }
        *self.conversation_id.lock() = None;
        self.emit(ConversationEvent::Reset);
    }

    /// Cancel the in-flight send and load the history of conversation `id`.
    ///
    /// Returns the number of messages loaded.
    pub async fn switch_conversation(&self, id: &ConversationId) -> Result<usize> {
        if self.backend.mode() != SessionMode::Registered {
            return Err(Error::NotRegistered);
        }

        self.handle.abort();
        self.store.lock().reset();
        *self.conversation_id.lock() = Some(id.clone());

        let history = match self.backend.fetch_history(id).await {
            Ok(history) => history,
            Err(vchat_api::Error::Unauthorized) => return Err(Error::NotRegistered),
            Err(e) => {
                tracing::warn!("Failed to load conversation {}: {}", id, e);
                self.notifier
                    .notify(Notice::new(e.to_string(), NoticeLevel::Error));
                self.emit(ConversationEvent::Reset);
                return Err(e.into());
            }
        };

        let count = history.len();
        self.store.lock().replace_all(history);
        self.emit(ConversationEvent::Reset);
        Ok(count)
    }

    fn reject(&self, error: vchat_api::Error, cancel: &CancellationToken) -> SendOutcome {
        tracing::warn!("Send failed before streaming: {}", error);
        if matches!(error, vchat_api::Error::SessionExpired) {
            self.notifier
                .notify(Notice::new(error.to_string(), NoticeLevel::Warning));
        }

        let apology = Message::assistant(MessageId::new_error(), PRE_STREAM_APOLOGY);
        let message_id = apology.id.clone();
        if !self.append_unless_cancelled(apology, cancel) {
            return SendOutcome::Cancelled;
        }
        self.emit(ConversationEvent::Failed {
            message_id: message_id.clone(),
            error: error.to_string(),
        });
        SendOutcome::Rejected { message_id }
    }

    /// Record the conversation a registered send opened
    fn adopt_conversation(&self, response: &SendResponse) {
        if self.backend.mode() != SessionMode::Registered {
            return;
        }
        let Some(id) = response.conversation_id.clone() else {
            return;
        };

        {
            let mut current = self.conversation_id.lock();
            if current.is_some() {
                return;
            }
            *current = Some(id.clone());
        }
        tracing::info!("Started conversation {}", id);
        self.emit(ConversationEvent::ConversationCreated {
            id,
            title: response.title.clone(),
        });
    }

    /// Append unless the send was cancelled; checked under the store lock so
    /// a concurrent reset never sees a late append.
    fn append_unless_cancelled(&self, message: Message, cancel: &CancellationToken) -> bool {
        let mut store = self.store.lock();
        if cancel.is_cancelled() {
            return false;
        }
        store.append(message);
        true
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Applies stream events to one assistant placeholder
struct PlaceholderWriter {
    store: SharedStore,
    message_id: MessageId,
    events: broadcast::Sender<ConversationEvent>,
    received: bool,
}

impl StreamHandler for PlaceholderWriter {
    fn on_chunk(&mut self, payload: &ChunkPayload) {
        let delta = payload.delta_text();
        self.received = true;

        let patched = self.store.lock().patch(&self.message_id, |m| {
            m.content.push_str(delta);
            *m.thinking = false;
        });
        if patched && !delta.is_empty() {
            let _ = self.events.send(ConversationEvent::Delta {
                message_id: self.message_id.clone(),
                text: delta.to_string(),
            });
        }
    }

    fn on_complete(&mut self, _payload: serde_json::Value) {
        self.store
            .lock()
            .patch(&self.message_id, |m| *m.thinking = false);
        let _ = self.events.send(ConversationEvent::Completed {
            message_id: self.message_id.clone(),
        });
    }

    fn on_error(&mut self, error: vchat_api::Error) {
        tracing::warn!("Stream for {} failed: {}", self.message_id, error);

        // A partial answer is kept as-is
        let received = self.received;
        self.store.lock().patch(&self.message_id, |m| {
            if !received && m.content.is_empty() {
                *m.content = STREAM_APOLOGY.to_string();
            }
            *m.thinking = false;
        });
        let _ = self.events.send(ConversationEvent::Failed {
            message_id: self.message_id.clone(),
            error: error.to_string(),
        });
    }
}
