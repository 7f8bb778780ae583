//! Stream multiplexer.
//!
//! Drives the provider's chunk stream on a spawned task and hands each event
//! to the caller through a bounded channel as soon as it arrives. The relay
//! follows `Idle -> Streaming -> {Completed | Failed}`; only `Streaming`
//! emits chunks, and exactly one terminal event is ever sent.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use pulse_core::StreamEvent;

use crate::error::ChatError;
use crate::provider::{ChunkStream, Conversation};

/// Events buffered between the relay task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Stream of wire events for one reply.
pub type EventStream = ReceiverStream<StreamEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Completed | RelayState::Failed)
    }
}

/// Sending half of a reply, enforcing the event ordering rules.
#[derive(Debug)]
pub struct EventGate {
    state: RelayState,
    tx: mpsc::Sender<StreamEvent>,
}

impl EventGate {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            state: RelayState::Idle,
            tx,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// `Idle -> Streaming`.
    pub fn begin(&mut self) {
        if self.state == RelayState::Idle {
            self.state = RelayState::Streaming;
        }
    }

    /// Emit one chunk. Returns false when the chunk was refused, either
    /// because the gate is not streaming or because the consumer is gone.
    pub async fn chunk(&mut self, text: String) -> bool {
        if self.state != RelayState::Streaming {
            return false;
        }
        if self.tx.send(StreamEvent::Chunk { text }).await.is_err() {
            debug!("Reply consumer dropped, abandoning stream");
            self.state = RelayState::Failed;
            return false;
        }
        true
    }

    /// `Streaming -> Completed`, emitting `Done`.
    pub async fn complete(&mut self) {
        if self.state != RelayState::Streaming {
            return;
        }
        self.state = RelayState::Completed;
        let _ = self.tx.send(StreamEvent::Done).await;
    }

    /// Resolves once the consumer has dropped its end.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// `{Idle | Streaming} -> Failed`, emitting `Error`.
    pub async fn fail(&mut self, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RelayState::Failed;
        let _ = self.tx.send(StreamEvent::error(message)).await;
    }
}

/// Relay an already-open provider stream.
///
/// Dropping the returned stream stops the relay immediately, even while the
/// provider is stalled, and drops the provider stream with it.
pub fn relay(mut chunks: ChunkStream) -> EventStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut gate = EventGate::new(tx);
        gate.begin();

        let mut emitted = 0usize;
        loop {
            let item = tokio::select! {
                item = chunks.next() => item,
                _ = gate.closed() => {
                    debug!(chunks = emitted, "Reply consumer dropped, abandoning stream");
                    return;
                }
            };
            let Some(item) = item else { break };
            match item {
                Ok(text) => {
                    if !gate.chunk(text).await {
                        return;
                    }
                    emitted += 1;
                }
                Err(e) => {
                    error!(chunks = emitted, error = %e, "Provider stream failed");
                    gate.fail(e.to_string()).await;
                    return;
                }
            }
        }

        debug!(chunks = emitted, "Provider stream completed");
        gate.complete().await;
    });

    ReceiverStream::new(rx)
}

/// Send `message` on `conversation` and stream the reply.
///
/// A send that fails before the first chunk is returned as an error, since
/// nothing has been committed to the consumer yet. Failures after that
/// arrive as the stream's terminal `Error` event.
pub async fn stream(
    conversation: &mut dyn Conversation,
    message: &str,
) -> Result<EventStream, ChatError> {
    let chunks = conversation.send_and_stream(message).await.map_err(|e| {
        error!(error = %e, "Provider call failed before streaming");
        e
    })?;
    Ok(relay(chunks))
}
