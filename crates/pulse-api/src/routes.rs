//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the rate
//! limiter on `/chat`, and the endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use pulse_core::PulseError;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

/// Request bodies larger than this are rejected before parsing.
const BODY_LIMIT_BYTES: usize = 256 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let port = state.config.server.port;
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    let mut allowed_headers = vec![header::CONTENT_TYPE, header::ACCEPT];
    match HeaderName::from_bytes(state.config.session.header_name.as_bytes()) {
        Ok(name) => allowed_headers.push(name),
        Err(e) => tracing::warn!(
            header = %state.config.session.header_name,
            error = %e,
            "Session header name is not a valid header; leaving it out of CORS"
        ),
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers)
        .allow_credentials(true);

    let public_routes = Router::new().route("/health", get(handlers::health));

    let mut chat_routes = Router::new().route("/chat", post(handlers::chat));
    let rate = state.config.server.rate_limit_per_sec;
    if rate > 0 {
        chat_routes = chat_routes
            .layer(axum::middleware::from_fn(rate_limit_middleware))
            .layer(axum::Extension(RateLimiter::new(rate)));
    }

    public_routes
        .merge(chat_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured host and port.
pub async fn start_server(state: AppState) -> Result<(), PulseError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PulseError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| PulseError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
