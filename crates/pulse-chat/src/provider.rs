//! Generative-model provider abstraction.
//!
//! A provider opens a conversation primed with a history; the conversation
//! then sends one message and yields the reply as an incremental stream of
//! text chunks.

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::Stream;

use pulse_core::ProviderTurn;

use crate::error::ChatError;

/// Incremental reply from the provider, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Open a conversation seeded with `history`.
    async fn start_conversation(
        &self,
        history: Vec<ProviderTurn>,
    ) -> Result<Box<dyn Conversation>, ChatError>;
}

#[async_trait]
pub trait Conversation: Send {
    /// Send `message` and stream the reply.
    ///
    /// Errors returned here happen before any chunk was produced; errors
    /// inside the stream happen mid-reply.
    async fn send_and_stream(&mut self, message: &str) -> Result<ChunkStream, ChatError>;
}

// =============================================================================
// ScriptedProvider
// =============================================================================

/// One step of a scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Chunk(String),
    Fail(String),
}

/// What a [`ScriptedProvider`] was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub history: Vec<ProviderTurn>,
    pub message: String,
}

/// Provider that replays a fixed script and records every call.
///
/// Used to exercise the turn engine and HTTP surface without a network.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    steps: Vec<ScriptStep>,
    refuse_with: Option<String>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl ScriptedProvider {
    /// Reply with `chunks`, then finish normally.
    pub fn replying<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: chunks
                .into_iter()
                .map(|c| ScriptStep::Chunk(c.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Reply with `chunks`, then fail with `error`.
    pub fn failing_after<I, S>(chunks: I, error: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut provider = Self::replying(chunks);
        provider.steps.push(ScriptStep::Fail(error.into()));
        provider
    }

    /// Reject the send itself, before any chunk.
    pub fn refusing(error: impl Into<String>) -> Self {
        Self {
            refuse_with: Some(error.into()),
            ..Self::default()
        }
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_conversation(
        &self,
        history: Vec<ProviderTurn>,
    ) -> Result<Box<dyn Conversation>, ChatError> {
        Ok(Box::new(ScriptedConversation {
            provider: self.clone(),
            history,
        }))
    }
}

struct ScriptedConversation {
    provider: ScriptedProvider,
    history: Vec<ProviderTurn>,
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send_and_stream(&mut self, message: &str) -> Result<ChunkStream, ChatError> {
        if let Ok(mut sent) = self.provider.sent.lock() {
            sent.push(SentMessage {
                history: self.history.clone(),
                message: message.to_string(),
            });
        }

        if let Some(error) = &self.provider.refuse_with {
            return Err(ChatError::Provider(error.clone()));
        }

        let items: Vec<Result<String, ChatError>> = self
            .provider
            .steps
            .iter()
            .map(|step| match step {
                ScriptStep::Chunk(text) => Ok(text.clone()),
                ScriptStep::Fail(error) => Err(ChatError::Provider(error.clone())),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
