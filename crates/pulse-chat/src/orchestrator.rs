//! Turn orchestration: one chat request from validation to reply stream.
//!
//! The first turn of a conversation (empty history) is augmented with a
//! freshly aggregated context snapshot. Later turns forward the caller's
//! message untouched and never touch the data sources.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pulse_context::Aggregator;
use pulse_core::{CallerIdentity, Turn};

use crate::compose::compose;
use crate::error::ChatError;
use crate::history::build_history;
use crate::provider::ChatProvider;
use crate::stream::{stream, EventStream};

/// Body of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn is_first_turn(&self) -> bool {
        self.history.is_empty()
    }
}

pub struct ChatOrchestrator {
    aggregator: Arc<Aggregator>,
    provider: Arc<dyn ChatProvider>,
    max_message_chars: usize,
}

impl ChatOrchestrator {
    pub fn new(
        aggregator: Arc<Aggregator>,
        provider: Arc<dyn ChatProvider>,
        max_message_chars: usize,
    ) -> Self {
        Self {
            aggregator,
            provider,
            max_message_chars,
        }
    }

    /// Reject empty messages and messages over the configured length.
    pub fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.max_message_chars {
            return Err(ChatError::MessageTooLong(self.max_message_chars));
        }
        Ok(())
    }

    /// The text actually sent to the provider for `request`.
    ///
    /// Aggregates and composes only on the first turn.
    pub async fn outgoing_message(&self, request: &ChatRequest, caller: &CallerIdentity) -> String {
        if !request.is_first_turn() {
            debug!(
                prior_turns = request.history.len(),
                "Follow-up turn, forwarding message as-is"
            );
            return request.message.clone();
        }

        let snapshot = self.aggregator.aggregate(caller).await;
        compose(&snapshot, caller, &request.message)
    }

    /// Handle one chat request.
    ///
    /// Errors are returned only before streaming starts (validation or a
    /// provider that refuses the call); failures after that arrive as the
    /// stream's terminal `Error` event.
    pub async fn handle(
        &self,
        request: &ChatRequest,
        caller: &CallerIdentity,
    ) -> Result<EventStream, ChatError> {
        self.validate(&request.message)?;

        let history = build_history(&request.history);
        let outgoing = self.outgoing_message(request, caller).await;

        info!(
            caller_id = caller.id,
            provider = self.provider.name(),
            first_turn = request.is_first_turn(),
            history_turns = history.len(),
            "Starting reply"
        );

        let mut conversation = self.provider.start_conversation(history).await?;
        stream(&mut *conversation, &outgoing).await
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("aggregator", &self.aggregator)
            .field("provider", &self.provider.name())
            .field("max_message_chars", &self.max_message_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use pulse_context::{SourceError, SourceFetcher};
    use pulse_core::config::DisplayCaps;
    use pulse_core::{ProviderRole, Record, SourceKind, StreamEvent};
    use serde_json::json;

    use crate::compose::DEGRADED_WARNING;
    use crate::history::PRIMING_TURNS;
    use crate::provider::ScriptedProvider;

    struct CountingSource {
        kind: SourceKind,
        records: usize,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceFetcher for CountingSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn deadline(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn load(&self, _caller: &CallerIdentity) -> Result<Vec<Record>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::unavailable(self.kind, "HTTP 500"));
            }
            Ok((0..self.records)
                .filter_map(|i| Record::from_value(json!({ "name": format!("r{}", i) })))
                .collect())
        }
    }

    fn aggregator(totals: [usize; 4], fail: bool, calls: &Arc<AtomicUsize>) -> Arc<Aggregator> {
        let sources: Vec<Arc<dyn SourceFetcher>> = SourceKind::ALL
            .into_iter()
            .zip(totals)
            .map(|(kind, records)| {
                Arc::new(CountingSource {
                    kind,
                    records,
                    fail,
                    calls: Arc::clone(calls),
                }) as Arc<dyn SourceFetcher>
            })
            .collect();
        Arc::new(Aggregator::new(sources, DisplayCaps::default()))
    }

    fn orchestrator(
        totals: [usize; 4],
        fail: bool,
        provider: &ScriptedProvider,
    ) -> (ChatOrchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = ChatOrchestrator::new(
            aggregator(totals, fail, &calls),
            Arc::new(provider.clone()),
            100,
        );
        (orchestrator, calls)
    }

    #[tokio::test]
    async fn test_first_turn_is_augmented() {
        let provider = ScriptedProvider::replying(["Olá"]);
        let (orchestrator, calls) = orchestrator([3, 5, 0, 2], false, &provider);
        let caller = CallerIdentity::new(9, "Ana");

        let events: Vec<StreamEvent> = orchestrator
            .handle(&ChatRequest::new("Resumo do dia?"), &caller)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events, vec![StreamEvent::chunk("Olá"), StreamEvent::Done]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].history.len(), PRIMING_TURNS);
        assert!(sent[0].message.contains("Usuário: Ana"));
        assert!(sent[0].message.contains("Totais: leads=3, parceiros=5, produtos=0, pedidos=2"));
        assert!(sent[0].message.ends_with("Resumo do dia?"));
        assert!(!sent[0].message.contains(DEGRADED_WARNING));
    }

    #[tokio::test]
    async fn test_follow_up_skips_aggregation() {
        let provider = ScriptedProvider::replying(["ok"]);
        let (orchestrator, calls) = orchestrator([3, 5, 0, 2], false, &provider);
        let request = ChatRequest::new("E os pedidos?")
            .with_history(vec![Turn::user("Resumo?"), Turn::assistant("Tudo certo.")]);

        let events: Vec<StreamEvent> = orchestrator
            .handle(&request, &CallerIdentity::anonymous())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let sent = provider.sent();
        assert_eq!(sent[0].message, "E os pedidos?");
        assert_eq!(sent[0].history.len(), PRIMING_TURNS + 2);
        assert_eq!(sent[0].history[3].role, ProviderRole::Model);
    }

    #[tokio::test]
    async fn test_all_sources_failed_still_calls_provider() {
        let provider = ScriptedProvider::replying(["Desculpe, sem dados agora."]);
        let (orchestrator, _calls) = orchestrator([1, 1, 1, 1], true, &provider);

        let events: Vec<StreamEvent> = orchestrator
            .handle(&ChatRequest::new("Resumo?"), &CallerIdentity::anonymous())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Done);
        assert!(provider.sent()[0].message.contains(DEGRADED_WARNING));
    }

    #[tokio::test]
    async fn test_mid_stream_failure() {
        let provider = ScriptedProvider::failing_after(["a", "b"], "overloaded");
        let (orchestrator, _calls) = orchestrator([0, 0, 0, 0], false, &provider);

        let events: Vec<StreamEvent> = orchestrator
            .handle(&ChatRequest::new("oi"), &CallerIdentity::anonymous())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::chunk("a"),
                StreamEvent::chunk("b"),
                StreamEvent::error("provider error: overloaded"),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_refusal_is_returned_before_streaming() {
        let provider = ScriptedProvider::refusing("quota");
        let (orchestrator, _calls) = orchestrator([0, 0, 0, 0], false, &provider);
        let err = orchestrator
            .handle(&ChatRequest::new("oi"), &CallerIdentity::anonymous())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ChatError::Provider("quota".to_string()));
    }

    #[tokio::test]
    async fn test_validation() {
        let provider = ScriptedProvider::replying(["x"]);
        let (orchestrator, calls) = orchestrator([1, 1, 1, 1], false, &provider);

        let err = orchestrator
            .handle(&ChatRequest::new("   "), &CallerIdentity::anonymous())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ChatError::EmptyMessage);

        let err = orchestrator
            .handle(&ChatRequest::new("a".repeat(101)), &CallerIdentity::anonymous())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ChatError::MessageTooLong(100));

        // Character count, not byte length.
        assert!(orchestrator.validate(&"é".repeat(100)).is_ok());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(provider.sent().is_empty());
    }

    #[test]
    fn test_chat_request_deserializes_without_history() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"oi"}"#).unwrap();
        assert!(request.is_first_turn());

        let request: ChatRequest = serde_json::from_str(
            r#"{"message":"e?","history":[{"role":"user","content":"oi"},{"role":"assistant","content":"olá"}]}"#,
        )
        .unwrap();
        assert_eq!(request.history.len(), 2);
        assert!(request.history[1].is_assistant());
    }
}
