//! Stream consumer: turns a stream id into ordered application events

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    client::ChatBackend,
    error::Error,
    frame::{self, Frame, FrameDecoder},
    types::{ChunkPayload, StreamId},
};

/// Events produced while consuming one stream
#[derive(Debug)]
pub enum StreamEvent {
    /// Incremental text
    Chunk(ChunkPayload),
    /// Normal end, with the (possibly null) payload of the `complete` frame
    Complete(serde_json::Value),
    /// Transport failure or backend-reported error
    Error(Error),
}

impl StreamEvent {
    /// Check if this is a terminal event (Complete or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_) | StreamEvent::Error(_))
    }
}

/// A stream of stream events; it ends right after the first terminal event
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Lifecycle of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    /// Abandoned by the caller through its cancellation token
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }
}

/// Guards the stream state machine; terminal states are final.
#[derive(Debug)]
pub struct StreamSession {
    state: StreamState,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&mut self, next: StreamState) -> bool {
        use StreamState::*;

        let allowed = matches!(
            (self.state, next),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Failed)
                | (Connecting, Cancelled)
                | (Streaming, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
        );
        if allowed {
            self.state = next;
        } else {
            tracing::debug!("Ignoring stream transition {:?} -> {:?}", self.state, next);
        }
        allowed
    }
}

/// Receiver of decoded stream events.
///
/// `on_complete` and `on_error` are mutually exclusive and fire at most once;
/// nothing fires after either of them.
pub trait StreamHandler: Send {
    fn on_chunk(&mut self, payload: &ChunkPayload);
    fn on_complete(&mut self, payload: serde_json::Value);
    fn on_error(&mut self, error: Error);
}

/// Opens streams against a backend and decodes their frames
#[derive(Clone)]
pub struct StreamConsumer {
    backend: Arc<dyn ChatBackend>,
}

impl StreamConsumer {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Connect to `stream_id` and yield its events in arrival order.
    ///
    /// The returned stream ends after the first `Complete` or `Error`. When
    /// `cancel` fires it ends without yielding anything further. A body that
    /// ends without a `complete` frame counts as completed.
    pub fn events(&self, stream_id: StreamId, cancel: CancellationToken) -> StreamEventStream {
        let backend = Arc::clone(&self.backend);

        Box::pin(stream! {
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = backend.open_stream(&stream_id) => result,
            };

            let mut body = match connected {
                Ok(body) => body,
                Err(e) => {
                    yield StreamEvent::Error(e);
                    return;
                }
            };

            let mut decoder = FrameDecoder::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = body.next() => next,
                };

                match next {
                    None => {
                        let dropped = decoder.finish();
                        if dropped > 0 {
                            tracing::debug!(
                                "Stream {} ended with {} undecoded bytes",
                                stream_id,
                                dropped
                            );
                        }
                        yield StreamEvent::Complete(serde_json::Value::Null);
                        return;
                    }
                    Some(Err(e)) => {
                        yield StreamEvent::Error(e);
                        return;
                    }
                    Some(Ok(bytes)) => {
                        for decoded in decoder.push(&bytes) {
                            if cancel.is_cancelled() {
                                return;
                            }
                            match decoded {
                                Frame::Chunk(payload) => yield StreamEvent::Chunk(payload),
                                Frame::Complete(payload) => {
                                    yield StreamEvent::Complete(payload);
                                    return;
                                }
                                Frame::Error(payload) => {
                                    yield StreamEvent::Error(Error::Remote(frame::error_message(&payload)));
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume `stream_id` to the end, dispatching into `handler`.
    ///
    /// Returns the terminal state reached.
    pub async fn open<H>(
        &self,
        stream_id: &StreamId,
        handler: &mut H,
        cancel: CancellationToken,
    ) -> StreamState
    where
        H: StreamHandler + ?Sized,
    {
        let mut session = StreamSession::new();
        session.advance(StreamState::Connecting);

        let mut events = self.events(stream_id.clone(), cancel);
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Chunk(payload) => {
                    if session.advance(StreamState::Streaming) {
                        handler.on_chunk(&payload);
                    }
                }
                StreamEvent::Complete(payload) => {
                    session.advance(StreamState::Streaming);
                    if session.advance(StreamState::Completed) {
                        handler.on_complete(payload);
                    }
                    break;
                }
                StreamEvent::Error(e) => {
                    tracing::debug!("Stream {} failed: {}", stream_id, e);
                    if session.advance(StreamState::Failed) {
                        handler.on_error(e);
                    }
                    break;
                }
            }
        }

        if !session.state().is_terminal() {
            session.advance(StreamState::Cancelled);
        }
        session.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ByteStream, SessionMode};
    use crate::types::{ConversationId, Message, SendRequest, SendResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Backend whose stream body is a fixed list of reads
    struct ScriptedStream {
        reads: Mutex<Option<Vec<crate::Result<Vec<u8>>>>>,
        connect_error: Mutex<Option<Error>>,
    }

    impl ScriptedStream {
        fn new(reads: Vec<&'static str>) -> Self {
            Self {
                reads: Mutex::new(Some(
                    reads.into_iter().map(|r| Ok(r.as_bytes().to_vec())).collect(),
                )),
                connect_error: Mutex::new(None),
            }
        }

        fn with_reads(reads: Vec<crate::Result<Vec<u8>>>) -> Self {
            Self {
                reads: Mutex::new(Some(reads)),
                connect_error: Mutex::new(None),
            }
        }

        fn failing(error: Error) -> Self {
            Self {
                reads: Mutex::new(None),
                connect_error: Mutex::new(Some(error)),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedStream {
        fn mode(&self) -> SessionMode {
            SessionMode::Guest
        }

        async fn send_message(&self, _request: &SendRequest) -> crate::Result<SendResponse> {
            unreachable!("not used by stream tests")
        }

        async fn open_stream(&self, _stream_id: &StreamId) -> crate::Result<ByteStream> {
            if let Some(e) = self.connect_error.lock().take() {
                return Err(e);
            }
            let reads = self.reads.lock().take().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(reads)))
        }

        async fn fetch_history(&self, _id: &ConversationId) -> crate::Result<Vec<Message>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct Recorder {
        deltas: Vec<String>,
        completes: u32,
        errors: Vec<String>,
    }

    impl StreamHandler for Recorder {
        fn on_chunk(&mut self, payload: &ChunkPayload) {
            self.deltas.push(payload.delta_text().to_string());
        }
        fn on_complete(&mut self, _payload: serde_json::Value) {
            self.completes += 1;
        }
        fn on_error(&mut self, error: Error) {
            self.errors.push(error.to_string());
        }
    }

    fn consumer(backend: ScriptedStream) -> StreamConsumer {
        StreamConsumer::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_chunks_in_order_then_complete() {
        let c = consumer(ScriptedStream::new(vec![
            "event: chunk\ndata: {\"content\":\"Chào\"}\n\nevent: ch",
            "unk\ndata: {\"content\":\" bạn\"}\n\n",
            "event: complete\ndata: {}\n\n",
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("abc"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Completed);
        assert_eq!(rec.deltas, vec!["Chào", " bạn"]);
        assert_eq!(rec.completes, 1);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_fires_after_complete() {
        let c = consumer(ScriptedStream::new(vec![
            "event: complete\ndata: {}\n\nevent: chunk\ndata: {\"content\":\"late\"}\n\n",
            "event: error\ndata: {}\n\n",
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Completed);
        assert!(rec.deltas.is_empty());
        assert_eq!(rec.completes, 1);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn test_error_frame_is_terminal() {
        let c = consumer(ScriptedStream::new(vec![
            "event: chunk\ndata: {\"content\":\"Đang xử lý\"}\n\n",
            "event: error\ndata: {\"message\":\"worker died\"}\n\nevent: complete\ndata: {}\n\n",
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Failed);
        assert_eq!(rec.deltas, vec!["Đang xử lý"]);
        assert_eq!(rec.completes, 0);
        assert_eq!(rec.errors, vec!["Stream error: worker died"]);
    }

    #[tokio::test]
    async fn test_connect_failure_fires_single_error() {
        let c = consumer(ScriptedStream::failing(Error::StreamStatus(404)));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Failed);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.completes, 0);
    }

    #[tokio::test]
    async fn test_read_failure_mid_stream() {
        let c = consumer(ScriptedStream::with_reads(vec![
            Ok(b"event: chunk\ndata: {\"content\":\"partial\"}\n\n".to_vec()),
            Err(Error::Remote("connection reset".into())),
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Failed);
        assert_eq!(rec.deltas, vec!["partial"]);
        assert_eq!(rec.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_body_end_without_complete_frame_completes() {
        let c = consumer(ScriptedStream::new(vec![
            "event: chunk\ndata: {\"text\":\"t\"}\n\n",
            "event: chunk\ndata: {\"content\":\"cut",
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Completed);
        assert_eq!(rec.deltas, vec!["t"]);
        assert_eq!(rec.completes, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_abort() {
        let c = consumer(ScriptedStream::new(vec![
            "event: chunk\ndata: {oops\n\n",
            "event: chunk\ndata: {\"delta\":\"fine\"}\n\nevent: complete\ndata:\n\n",
        ]));
        let mut rec = Recorder::default();
        let state = c
            .open(&StreamId::new("s"), &mut rec, CancellationToken::new())
            .await;

        assert_eq!(state, StreamState::Completed);
        assert_eq!(rec.deltas, vec!["fine"]);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_connect_fires_nothing() {
        let c = consumer(ScriptedStream::new(vec![
            "event: chunk\ndata: {\"content\":\"x\"}\n\n",
        ]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rec = Recorder::default();
        let state = c.open(&StreamId::new("s"), &mut rec, cancel).await;

        assert_eq!(state, StreamState::Cancelled);
        assert!(rec.deltas.is_empty());
        assert_eq!(rec.completes, 0);
        assert!(rec.errors.is_empty());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut s = StreamSession::new();
        assert!(!s.advance(StreamState::Streaming));
        assert!(s.advance(StreamState::Connecting));
        assert!(s.advance(StreamState::Streaming));
        assert!(s.advance(StreamState::Streaming));
        assert!(s.advance(StreamState::Completed));
        assert!(!s.advance(StreamState::Failed));
        assert!(!s.advance(StreamState::Streaming));
        assert_eq!(s.state(), StreamState::Completed);
    }
}
