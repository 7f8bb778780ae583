//! Application state shared across all route handlers.
//!
//! Passed to handlers via axum's State extractor. Nothing in here is mutated
//! after startup, so every field is a plain `Arc`.

use std::sync::Arc;
use std::time::Instant;

use pulse_chat::{ChatOrchestrator, ChatProvider};
use pulse_context::Aggregator;
use pulse_core::PulseConfig;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<PulseConfig>,
    /// Turn engine serving `/chat`.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: PulseConfig, aggregator: Aggregator, provider: Arc<dyn ChatProvider>) -> Self {
        let orchestrator = ChatOrchestrator::new(
            Arc::new(aggregator),
            provider,
            config.server.max_message_chars,
        );
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
