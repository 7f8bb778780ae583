//! Session token to caller identity.
//!
//! The token is read from the session cookie, falling back to a header, and
//! is URL-safe base64 of `{"id": <int>, "name": <string>}`. Anything that
//! cannot be decoded resolves to the anonymous identity; a bad session never
//! fails a request.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use pulse_core::config::SessionConfig;
use pulse_core::{CallerIdentity, ANONYMOUS_DISPLAY_NAME};

#[derive(Debug, Deserialize)]
struct SessionClaims {
    id: i64,
    #[serde(default)]
    name: Option<String>,
}

/// Find the raw session token in the request headers.
fn find_token<'a>(headers: &'a HeaderMap, config: &SessionConfig) -> Option<&'a str> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == config.cookie_name)
        .map(|(_, value)| value.trim());

    from_cookie
        .or_else(|| {
            headers
                .get(config.header_name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        })
        .filter(|token| !token.is_empty())
}

/// Decode a token into an identity.
pub fn decode_token(token: &str) -> Option<CallerIdentity> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')).ok()?;
    let claims: SessionClaims = serde_json::from_slice(&bytes).ok()?;
    if claims.id < 0 {
        return None;
    }

    let name = claims
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string());
    Some(CallerIdentity::new(claims.id, name))
}

/// Encode an identity as a session token.
pub fn encode_token(identity: &CallerIdentity) -> String {
    let claims = serde_json::json!({ "id": identity.id, "name": identity.display_name });
    URL_SAFE_NO_PAD.encode(claims.to_string())
}

/// Resolve the caller for a request. Never fails.
pub fn resolve_caller_identity(headers: &HeaderMap, config: &SessionConfig) -> CallerIdentity {
    let Some(token) = find_token(headers, config) else {
        return CallerIdentity::anonymous();
    };

    match decode_token(token) {
        Some(identity) => identity,
        None => {
            debug!("Malformed session token, using anonymous identity");
            CallerIdentity::anonymous()
        }
    }
}
