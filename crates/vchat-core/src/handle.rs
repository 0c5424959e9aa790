//! A cloneable handle on the in-flight send, for cancelling it from outside.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// Tracks the single send-message transaction a controller may run.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SendHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    in_flight: Arc<AtomicBool>,
    idle_notify: Arc<tokio::sync::Notify>,
}

impl Default for SendHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SendHandle {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Claim the in-flight slot.
    ///
    /// Returns `None` if another send holds it. The slot is released when
    /// the returned guard is dropped.
    pub(crate) fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        Some(InFlightGuard {
            handle: self.clone(),
            token,
        })
    }

    /// Abandon the current send, if any. Its stream stops delivering.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a send is currently in flight.
    pub fn is_streaming(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no send is in flight.
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_streaming() {
            return;
        }
        notified.await;
    }
}

/// Proof of owning the in-flight slot
pub(crate) struct InFlightGuard {
    handle: SendHandle,
    token: CancellationToken,
}

impl InFlightGuard {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.handle.in_flight.store(false, Ordering::Release);
        self.handle.idle_notify.notify_waiters();
    }
}
