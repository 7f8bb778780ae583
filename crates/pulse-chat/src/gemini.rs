//! Gemini-style streaming provider over HTTP.
//!
//! `POST {base_url}/models/{model}:streamGenerateContent?alt=sse` with the
//! whole conversation in `contents` and the key in `x-goog-api-key`; the key
//! never appears in a URL, so transport errors cannot echo it. The reply arrives as SSE
//! frames whose `data` is a JSON chunk; the text of a chunk is the
//! concatenation of `candidates[0].content.parts[*].text`.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use pulse_core::config::ProviderConfig;
use pulse_core::{ProviderRole, ProviderTurn};

use crate::error::ChatError;
use crate::provider::{ChatProvider, ChunkStream, Conversation};

const API_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn new(role: ProviderRole, text: impl Into<String>) -> Self {
        Self {
            role: role.as_str(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        match &self.status {
            Some(status) => format!("{}: {}", status, self.message),
            None => self.message.clone(),
        }
    }
}

/// Parse one SSE `data` payload.
///
/// Returns `Ok(None)` for frames that carry no text.
fn parse_chunk(data: &str) -> Result<Option<String>, ChatError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "Failed to parse provider SSE chunk");
            return Ok(None);
        }
    };

    if let Some(err) = chunk.error {
        return Err(ChatError::Provider(err.describe()));
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

/// Turn a non-success response body into a readable message.
fn parse_api_error(body: &str, status: u16) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => format!("HTTP {}: {}", status, envelope.error.describe()),
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    }
}

// =============================================================================
// GeminiProvider
// =============================================================================

pub struct GeminiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GeminiProvider {
    /// Build a provider with its own HTTP client.
    pub fn new(config: ProviderConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: ProviderConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn start_conversation(
        &self,
        history: Vec<ProviderTurn>,
    ) -> Result<Box<dyn Conversation>, ChatError> {
        let contents = history
            .into_iter()
            .map(|turn| Content::new(turn.role, turn.text))
            .collect();
        Ok(Box::new(GeminiConversation {
            client: self.client.clone(),
            url: self.stream_url(),
            api_key: self.config.api_key.clone(),
            temperature: self.config.temperature,
            contents,
        }))
    }
}

struct GeminiConversation {
    client: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
    contents: Vec<Content>,
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send_and_stream(&mut self, message: &str) -> Result<ChunkStream, ChatError> {
        self.contents.push(Content::new(ProviderRole::User, message));

        debug!(turns = self.contents.len(), "Starting provider stream");

        let body = GenerateRequest {
            contents: &self.contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = parse_api_error(&body_text, status.as_u16());
            error!(status = status.as_u16(), error = %message, "Provider rejected request");
            return Err(ChatError::Provider(message));
        }

        let chunks = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                let item = match event {
                    Ok(event) => parse_chunk(&event.data).transpose(),
                    Err(e) => Some(Err(ChatError::Transport(e.to_string()))),
                };
                std::future::ready(item)
            });

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(payloads: &[Value]) -> String {
        payloads
            .iter()
            .map(|p| format!("data: {}\r\n\r\n", p))
            .collect()
    }

    fn text_chunk(text: &str) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
    }

    fn provider(server: &MockServer) -> GeminiProvider {
        let config = ProviderConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            ..ProviderConfig::default()
        };
        GeminiProvider::with_client(config, reqwest::Client::new())
    }

    async fn mount_sse(server: &MockServer, body: String) {
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<String, ChatError>> {
        stream.collect().await
    }

    // -------------------------------------------------------------------------
    // parse_chunk
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_chunk_concatenates_parts() {
        let data = json!({"candidates": [{"content": {"parts": [{"text": "Olá"}, {"text": " mundo"}]}}]});
        assert_eq!(
            parse_chunk(&data.to_string()).unwrap().as_deref(),
            Some("Olá mundo")
        );
    }

    #[test]
    fn test_parse_chunk_without_text() {
        let data = json!({"candidates": [{"finishReason": "STOP"}]});
        assert_eq!(parse_chunk(&data.to_string()).unwrap(), None);
        assert_eq!(parse_chunk("").unwrap(), None);
        assert_eq!(parse_chunk("{}").unwrap(), None);
    }

    #[test]
    fn test_parse_chunk_error_payload() {
        let data = json!({"error": {"code": 500, "message": "internal", "status": "INTERNAL"}});
        let err = parse_chunk(&data.to_string()).unwrap_err();
        assert_eq!(err, ChatError::Provider("INTERNAL: internal".to_string()));
    }

    #[test]
    fn test_parse_chunk_skips_malformed() {
        assert_eq!(parse_chunk("not json").unwrap(), None);
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"code":400,"status":"INVALID_ARGUMENT","message":"API key not valid"}}"#;
        assert_eq!(
            parse_api_error(body, 400),
            "HTTP 400: INVALID_ARGUMENT: API key not valid"
        );
        assert_eq!(parse_api_error("", 503), "HTTP 503");
        assert_eq!(parse_api_error("bad gateway", 502), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_stream_url() {
        let config = ProviderConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            api_key: "k".to_string(),
            ..ProviderConfig::default()
        };
        let provider = GeminiProvider::with_client(config, reqwest::Client::new());
        assert_eq!(
            provider.stream_url(),
            "https://example.test/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }

    // -------------------------------------------------------------------------
    // Streaming over HTTP
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_streams_chunks_in_order() {
        let server = MockServer::start().await;
        mount_sse(
            &server,
            sse_body(&[
                text_chunk("Você tem "),
                json!({"candidates": [{"content": {"parts": []}}]}),
                text_chunk("3 leads."),
            ]),
        )
        .await;

        let provider = provider(&server);
        let mut conversation = provider
            .start_conversation(vec![ProviderTurn::new(ProviderRole::User, "primer")])
            .await
            .unwrap();
        let chunks = collect(conversation.send_and_stream("Quantos leads?").await.unwrap()).await;

        assert_eq!(
            chunks,
            vec![Ok("Você tem ".to_string()), Ok("3 leads.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_request_body_carries_history_and_message() {
        let server = MockServer::start().await;
        mount_sse(&server, sse_body(&[text_chunk("ok")])).await;

        let provider = provider(&server);
        let history = vec![
            ProviderTurn::new(ProviderRole::User, "instrução"),
            ProviderTurn::new(ProviderRole::Model, "entendido"),
        ];
        let mut conversation = provider.start_conversation(history).await.unwrap();
        let _ = collect(conversation.send_and_stream("pergunta").await.unwrap()).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "pergunta");
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[tokio::test]
    async fn test_error_status_fails_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"}
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let mut conversation = provider.start_conversation(Vec::new()).await.unwrap();
        let err = conversation.send_and_stream("oi").await.err().unwrap();
        assert_eq!(
            err,
            ChatError::Provider("HTTP 429: RESOURCE_EXHAUSTED: quota".to_string())
        );
    }

    #[tokio::test]
    async fn test_error_payload_mid_stream() {
        let server = MockServer::start().await;
        mount_sse(
            &server,
            sse_body(&[
                text_chunk("um"),
                text_chunk("dois"),
                json!({"error": {"message": "overloaded", "status": "UNAVAILABLE"}}),
            ]),
        )
        .await;

        let provider = provider(&server);
        let mut conversation = provider.start_conversation(Vec::new()).await.unwrap();
        let chunks = collect(conversation.send_and_stream("oi").await.unwrap()).await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Ok("um".to_string()));
        assert_eq!(chunks[1], Ok("dois".to_string()));
        assert_eq!(
            chunks[2],
            Err(ChatError::Provider("UNAVAILABLE: overloaded".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ProviderConfig::default()
        };
        let provider = GeminiProvider::new(config).unwrap();
        let mut conversation = provider.start_conversation(Vec::new()).await.unwrap();
        let err = conversation.send_and_stream("oi").await.err().unwrap();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_api_key() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: "SUPER-SECRET-KEY".to_string(),
            ..ProviderConfig::default()
        };
        let provider = GeminiProvider::new(config).unwrap();
        let mut conversation = provider.start_conversation(Vec::new()).await.unwrap();
        let err = conversation.send_and_stream("oi").await.err().unwrap();
        assert!(matches!(err, ChatError::Transport(_)));
        assert!(!err.to_string().contains("SUPER-SECRET-KEY"), "{}", err);
        assert!(!provider.stream_url().contains("SUPER-SECRET-KEY"));
    }

    #[tokio::test]
    async fn test_api_key_sent_as_header_only() {
        let server = MockServer::start().await;
        mount_sse(&server, sse_body(&[text_chunk("ok")])).await;

        let provider = provider(&server);
        let mut conversation = provider.start_conversation(Vec::new()).await.unwrap();
        let _ = collect(conversation.send_and_stream("oi").await.unwrap()).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.query_pairs().all(|(k, _)| k != "key"));
        assert_eq!(
            requests[0].headers.get(API_KEY_HEADER).map(|v| v.as_bytes()),
            Some("test-key".as_bytes())
        );
    }
}
