//! Generation backend boundary
//!
//! A streaming request produces a [`GenerationStream`]: an ordered channel of
//! events plus a [`GenerationHandle`] for cancellation. The producer side is a
//! [`GenerationSink`] whose terminal methods consume it, so a request can end
//! with at most one `Complete` or `Failed`.

use async_trait::async_trait;
use minimind_core::{SynthesisError, Synthesizer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Body ended before the backend said it was done
    #[error("stream ended unexpectedly")]
    Disconnected,

    /// Failure injected by a scripted backend
    #[error("{0}")]
    Scripted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub prompt: String,
    pub system: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            system: system.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Chunk(String),
    /// Carries the full generated text
    Complete(String),
    Failed(BackendError),
}

/// Cancellation and completion handle for one request
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    cancel: Arc<watch::Sender<bool>>,
    done: watch::Receiver<bool>,
}

impl GenerationHandle {
    /// Ask the producer to stop. Cooperative: the producer acknowledges by
    /// finishing, see [`wait_for_completion`](Self::wait_for_completion).
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Wait up to `timeout` for the producer to finish. Returns false on
    /// timeout.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let mut done = self.done.clone();
        let finished = tokio::time::timeout(timeout, done.wait_for(|finished| *finished))
            .await
            .is_ok();
        finished
    }
}

/// Producer side of a request
#[derive(Debug)]
pub struct GenerationSink {
    events: mpsc::UnboundedSender<GenerationEvent>,
    cancel: watch::Receiver<bool>,
    done: watch::Sender<bool>,
    text: String,
}

impl GenerationSink {
    /// Emit a chunk. Returns false once the request is cancelled or nobody is
    /// listening, at which point the producer should stop.
    pub fn chunk(&mut self, text: &str) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.text.push_str(text);
        self.events
            .send(GenerationEvent::Chunk(text.to_string()))
            .is_ok()
    }

    pub fn complete(self) {
        let text = self.text.clone();
        let _ = self.events.send(GenerationEvent::Complete(text));
    }

    pub fn fail(self, error: BackendError) {
        let _ = self.events.send(GenerationEvent::Failed(error));
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation is requested or every handle is gone
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        let _ = cancel.wait_for(|cancelled| *cancelled).await;
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Drop for GenerationSink {
    fn drop(&mut self) {
        self.done.send_replace(true);
    }
}

/// Consumer side of a request
#[derive(Debug)]
pub struct GenerationStream {
    pub id: Uuid,
    pub events: mpsc::UnboundedReceiver<GenerationEvent>,
    pub handle: GenerationHandle,
}

/// Create the two ends of a request
pub fn generation_channel(id: Uuid) -> (GenerationSink, GenerationStream) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (done_tx, done_rx) = watch::channel(false);

    let sink = GenerationSink {
        events: events_tx,
        cancel: cancel_rx,
        done: done_tx,
        text: String::new(),
    };
    let stream = GenerationStream {
        id,
        events: events_rx,
        handle: GenerationHandle {
            cancel: Arc::new(cancel_tx),
            done: done_rx,
        },
    };
    (sink, stream)
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start a streaming generation on a background task
    fn generate_streaming(&self, request: GenerationRequest) -> GenerationStream;

    /// One-shot generation
    async fn complete(&self, request: GenerationRequest) -> Result<String, BackendError>;
}

/// Lets any backend serve as the dream synthesizer
pub struct BackendSynthesizer {
    backend: Arc<dyn GenerationBackend>,
}

impl BackendSynthesizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Synthesizer for BackendSynthesizer {
    async fn synthesize(&self, prompt: &str, system: &str) -> Result<String, SynthesisError> {
        self.backend
            .complete(GenerationRequest::new(prompt, system))
            .await
            .map_err(|err| SynthesisError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_stops_after_cancel() {
        let (mut sink, mut stream) = generation_channel(Uuid::new_v4());
        assert!(sink.chunk("a"));
        stream.handle.cancel();
        assert!(stream.handle.is_cancelled());
        assert!(!sink.chunk("b"));
        drop(sink);

        assert_eq!(stream.events.recv().await, Some(GenerationEvent::Chunk("a".into())));
        assert_eq!(stream.events.recv().await, None);
        assert!(stream.handle.wait_for_completion(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_complete_carries_full_text() {
        let (mut sink, mut stream) = generation_channel(Uuid::new_v4());
        sink.chunk("hello ");
        sink.chunk("world");
        sink.complete();

        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }
        assert_eq!(events.last(), Some(&GenerationEvent::Complete("hello world".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_sees_late_finish() {
        let (sink, stream) = generation_channel(Uuid::new_v4());
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            sink.complete();
        });
        assert!(stream.handle.wait_for_completion(Duration::from_secs(5)).await);
        producer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_times_out() {
        let (_sink, stream) = generation_channel(Uuid::new_v4());
        assert!(!stream.handle.wait_for_completion(Duration::from_secs(2)).await);
    }
}
