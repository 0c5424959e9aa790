//! Transient user notices (toasts).
//!
//! Components that surface notices receive a [`Notifier`] explicitly. A
//! [`BufferedNotifier`] holds notices raised before a display sink exists and
//! flushes them, in order, once one is attached.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Visual weight of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Default,
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn new(message: impl Into<String>, level: NoticeLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }
}

/// Receiver of notices
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Drops every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}

type Sink = Box<dyn Fn(Notice) + Send + Sync>;

struct BufferState {
    sink: Option<Sink>,
    pending: VecDeque<Notice>,
}

/// Queues notices until a sink is attached
pub struct BufferedNotifier {
    state: Mutex<BufferState>,
    capacity: usize,
}

impl Default for BufferedNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl BufferedNotifier {
    /// Pending notices kept before the oldest is dropped
    pub const DEFAULT_CAPACITY: usize = 32;

    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                sink: None,
                pending: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Attach the display sink and deliver everything queued so far.
    pub fn attach<F>(&self, sink: F)
    where
        F: Fn(Notice) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        for notice in state.pending.drain(..) {
            sink(notice);
        }
        state.sink = Some(Box::new(sink));
    }

    /// Detach the sink; later notices are queued again.
    pub fn detach(&self) {
        self.state.lock().sink = None;
    }

    /// Number of queued notices
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Notifier for BufferedNotifier {
    fn notify(&self, notice: Notice) {
        if notice.message.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        if let Some(sink) = &state.sink {
            sink(notice);
            return;
        }

        if state.pending.len() >= self.capacity {
            tracing::warn!("Notice buffer full ({}), dropping oldest", self.capacity);
            state.pending.pop_front();
        }
        state.pending.push_back(notice);
    }
}
