//! Client-local transcript: an ordered, append/patch-only message list.

use std::sync::Arc;

use parking_lot::Mutex;
use vchat_api::{Message, MessageId};

/// Transcript shared between the controller, its stream handler and the UI.
pub type SharedStore = Arc<Mutex<MessageStore>>;

/// Called synchronously after every store mutation with the full transcript.
pub trait StoreObserver: Send {
    fn on_change(&mut self, messages: &[Message]);
}

/// The mutable part of a message exposed to [`MessageStore::patch`].
///
/// Identity, role and creation time are fixed once a message is appended.
pub struct PatchView<'a> {
    pub content: &'a mut String,
    pub thinking: &'a mut bool,
}

/// Ordered transcript of one conversation session
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a store for sharing
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Register an observer; it sees every later mutation.
    pub fn observe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    /// Insert at the tail.
    pub fn append(&mut self, mut message: Message) {
        if !message.content.is_empty() {
            message.thinking = false;
        }
        self.messages.push(message);
        self.notify();
    }

    /// Apply `update` to the message with `id`.
    ///
    /// Returns false, without touching anything, when the id is gone. That
    /// happens when the store was reset while a stream was still running.
    pub fn patch<F>(&mut self, id: &MessageId, update: F) -> bool
    where
        F: FnOnce(PatchView<'_>),
    {
        let Some(message) = self.messages.iter_mut().rev().find(|m| &m.id == id) else {
            tracing::debug!("Patch target {} no longer in transcript", id);
            return false;
        };

        update(PatchView {
            content: &mut message.content,
            thinking: &mut message.thinking,
        });
        if !message.content.is_empty() {
            message.thinking = false;
        }
        self.notify();
        true
    }

    /// Drop every message (new chat, conversation switch).
    pub fn reset(&mut self) {
        self.messages.clear();
        self.notify();
    }

    /// Replace the whole transcript (history load, rehydration).
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        for message in &mut self.messages {
            if !message.content.is_empty() {
                message.thinking = false;
            }
        }
        self.notify();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| &m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn notify(&mut self) {
        for observer in &mut self.observers {
            observer.on_change(&self.messages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchat_api::{Role, StreamId};

    struct CountingObserver(Arc<Mutex<Vec<usize>>>);

    impl StoreObserver for CountingObserver {
        fn on_change(&mut self, messages: &[Message]) {
            self.0.lock().push(messages.len());
        }
    }

    #[test]
    fn test_append_keeps_order() {
        let mut store = MessageStore::new();
        store.append(Message::user("one"));
        store.append(Message::user("two"));
        let texts: Vec<_> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(store.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn test_patch_accumulates_and_clears_thinking() {
        let mut store = MessageStore::new();
        let id = MessageId::placeholder_for(&StreamId::new("abc"));
        store.append(Message::placeholder(id.clone()));
        assert!(store.get(&id).unwrap().thinking);

        assert!(store.patch(&id, |m| m.content.push_str("Chào")));
        assert!(store.patch(&id, |m| m.content.push_str(" bạn")));

        let m = store.get(&id).unwrap();
        assert_eq!(m.content, "Chào bạn");
        assert!(!m.thinking);
    }

    #[test]
    fn test_patch_cannot_leave_thinking_with_content() {
        let mut store = MessageStore::new();
        let id = MessageId::new_error();
        store.append(Message::placeholder(id.clone()));
        store.patch(&id, |m| {
            m.content.push_str("x");
            *m.thinking = true;
        });
        assert!(!store.get(&id).unwrap().thinking);
    }

    #[test]
    fn test_patch_after_reset_is_a_no_op() {
        let mut store = MessageStore::new();
        let id = MessageId::placeholder_for(&StreamId::new("old"));
        store.append(Message::placeholder(id.clone()));
        store.reset();

        assert!(!store.patch(&id, |m| m.content.push_str("late")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_observers_see_every_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = MessageStore::new();
        store.observe(Box::new(CountingObserver(Arc::clone(&seen))));

        let id = MessageId::new_error();
        store.append(Message::user("hi"));
        store.append(Message::placeholder(id.clone()));
        store.patch(&id, |m| m.content.push_str("a"));
        store.patch(&MessageId::new_error(), |m| m.content.push_str("missing"));
        store.replace_all(vec![Message::user("restored")]);
        store.reset();

        assert_eq!(*seen.lock(), vec![1, 2, 2, 1, 0]);
    }
}
