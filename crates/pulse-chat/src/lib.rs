//! Turn engine for Pulse.
//!
//! Builds provider histories, composes the first-turn context block, talks
//! to the generative-model provider and relays its reply as stream events.

pub mod compose;
pub mod error;
pub mod gemini;
pub mod history;
pub mod orchestrator;
pub mod provider;
pub mod stream;

pub use compose::compose;
pub use error::ChatError;
pub use gemini::GeminiProvider;
pub use history::build_history;
pub use orchestrator::{ChatOrchestrator, ChatRequest};
pub use provider::{ChatProvider, ChunkStream, Conversation, ScriptedProvider};
pub use stream::{EventStream, RelayState};
