//! Pulse API crate - axum HTTP server, chat SSE endpoint, health check.
//!
//! Resolves the caller from the session, hands the request to the turn
//! engine and frames its reply as server-sent events.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod session;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
