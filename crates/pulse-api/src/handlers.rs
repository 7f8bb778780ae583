//! Route handler functions.
//!
//! `POST /chat` answers with server-sent events: one `data: {"text": ..}`
//! frame per chunk and a final `data: [DONE]`. A mid-stream failure aborts
//! the body instead, so the client sees a broken transfer rather than a
//! clean end of stream.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use pulse_chat::ChatRequest;
use pulse_core::StreamEvent;

use crate::error::ApiError;
use crate::session::resolve_caller_identity;
use crate::state::AppState;

/// Sentinel written as the last frame of a successful reply.
pub const DONE_MARKER: &str = "[DONE]";

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_SECS: u64 = 15;

// =============================================================================
// Response types
// =============================================================================

/// Payload of one chunk frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Body error used to abort a reply after its headers were sent.
#[derive(Debug, thiserror::Error)]
#[error("reply stream aborted: {0}")]
pub struct StreamAborted(pub String);

/// Frame one reply event.
pub fn sse_event(event: StreamEvent, request_id: Uuid) -> Result<Event, StreamAborted> {
    match event {
        StreamEvent::Chunk { text } => {
            let data = serde_json::to_string(&ChunkPayload { text }).unwrap_or_default();
            Ok(Event::default().data(data))
        }
        StreamEvent::Done => Ok(Event::default().data(DONE_MARKER)),
        StreamEvent::Error { message } => {
            error!(%request_id, error = %message, "Aborting reply stream");
            Err(StreamAborted(message))
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /chat - stream a reply as SSE.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, StreamAborted>> + Send>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let caller = resolve_caller_identity(&headers, &state.config.session);
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id, caller_id = caller.id);

    let events = state
        .orchestrator
        .handle(&request, &caller)
        .instrument(span)
        .await?;

    let frames = events.map(move |event| sse_event(event, request_id));
    Ok(Sse::new(frames).keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS))))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
