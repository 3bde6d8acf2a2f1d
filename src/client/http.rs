//! HTTP Client
//!
//! Gemini REST client: opens `streamGenerateContent` SSE streams and lists models.

use crate::api::streaming::parse_sse_line;
use crate::api::{ChunkStream, GenerationRequest};
use crate::client::classify::UpstreamFailure;
use crate::client::transport::GenerationTransport;
use crate::error::{ItineraError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_VERSION: &str = "v1beta";

/// HTTP client for the generative language API
#[derive(Debug, Clone)]
pub struct GeminiHttpClient {
    /// Inner reqwest client
    client: Client,

    /// API root, without the version segment
    base_url: String,
}

/// A model as reported by the `models` listing
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-2.0-flash`
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Model id without the `models/` prefix
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl GeminiHttpClient {
    /// Create a new HTTP client.
    ///
    /// No overall request timeout is set on the client: streams can be long.
    /// `read_timeout` bounds the gap between two reads of a response body.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10);
        if let Some(read_timeout) = read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ItineraError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn headers(api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| ItineraError::Config(format!("Invalid API key format: {}", e)))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);
        Ok(headers)
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, API_VERSION, model
        )
    }

    /// List models that support `generateContent`, following pagination
    pub async fn list_models(&self, api_key: &str) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/{}/models", self.base_url, API_VERSION);
        let headers = Self::headers(api_key)?;
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).headers(headers.clone());
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                return Err(UpstreamFailure::from_response(status, &body).into_error("models"));
            }

            let page: ModelList = serde_json::from_str(&body).map_err(|e| {
                ItineraError::Api {
                    status: status.as_u16(),
                    message: format!(
                        "Failed to parse model list: {}. Body: {}",
                        e,
                        body.chars().take(500).collect::<String>()
                    ),
                }
            })?;

            models.extend(page.models.into_iter().filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

#[async_trait]
impl GenerationTransport for GeminiHttpClient {
    async fn open_stream(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<ChunkStream> {
        use async_stream::stream;

        let response = self
            .client
            .post(self.stream_url(model))
            .headers(Self::headers(api_key)?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let failure = UpstreamFailure::from_response(status, &body);
            tracing::debug!(
                model,
                status = failure.status,
                code = failure.code.as_deref().unwrap_or("-"),
                "stream request rejected"
            );
            return Err(failure.into_error(model));
        }

        // Decode SSE lines; a chunk boundary may split a line or a UTF-8 sequence
        let mut byte_stream = response.bytes_stream();
        let s = stream! {
            let mut buffer = BytesMut::new();
            while let Some(bytes) = byte_stream.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) if e.is_timeout() => {
                        yield Err(ItineraError::Timeout(format!("stream read stalled: {}", e)));
                        return;
                    }
                    Err(e) => {
                        yield Err(ItineraError::Stream(format!("connection interrupted: {}", e)));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line = buffer.split_to(pos + 1);
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        Ok(Some(chunk)) => yield Ok(chunk),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if !buffer.is_empty() {
                match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::collect_text;
    use mockito::Matcher;

    const STREAM_PATH: &str = "/v1beta/models/gemini-2.0-flash:streamGenerateContent";

    fn client(server: &mockito::ServerGuard) -> GeminiHttpClient {
        GeminiHttpClient::new(server.url(), Duration::from_secs(5), Some(Duration::from_secs(5)))
            .unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client =
            GeminiHttpClient::new("https://example.com/", Duration::from_secs(1), None).unwrap();
        assert_eq!(
            client.stream_url("gemini-2.5-flash"),
            "https://example.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn test_open_stream_decodes_sse() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"{\\\"city\\\":\"}],\"role\":\"model\"}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" \\\"Bali\\\"}\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );
        let mock = server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
            .match_header("x-goog-api-key", "key-1")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client(&server)
            .open_stream(
                "gemini-2.0-flash",
                "key-1",
                &GenerationRequest::from_prompt("hello"),
            )
            .await
            .unwrap();
        let text = collect_text(stream).await.unwrap();

        assert_eq!(text, "{\"city\": \"Bali\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_stream_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .open_stream("gemini-2.0-flash", "key-1", &GenerationRequest::from_prompt("hi"))
            .await;

        match result {
            Err(err @ ItineraError::RateLimited { .. }) => assert!(err.is_rate_limited()),
            Err(other) => panic!("expected rate limit, got {:?}", other),
            Ok(_) => panic!("expected rate limit, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_open_stream_oversized_retry_delay() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"1e20s"}]}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .open_stream("gemini-2.0-flash", "key-1", &GenerationRequest::from_prompt("hi"))
            .await;

        match result {
            Err(ItineraError::RateLimited { retry_after, .. }) => assert_eq!(retry_after, None),
            Err(other) => panic!("expected rate limit, got {:?}", other),
            Ok(_) => panic!("expected rate limit, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_open_stream_bad_request_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"Invalid JSON payload received.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .open_stream("gemini-2.0-flash", "key-1", &GenerationRequest::from_prompt("hi"))
            .await;

        match result {
            Err(err @ ItineraError::Api { status: 400, .. }) => assert!(!err.is_rate_limited()),
            Err(other) => panic!("expected api error, got {:?}", other),
            Ok(_) => panic!("expected api error, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_list_models_filters_generate_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta/models")
            .match_header("x-goog-api-key", "key-1")
            .with_status(200)
            .with_body(
                r#"{"models":[
                    {"name":"models/gemini-2.0-flash","supportedGenerationMethods":["generateContent","countTokens"]},
                    {"name":"models/text-embedding-004","supportedGenerationMethods":["embedContent"]}
                ]}"#,
            )
            .create_async()
            .await;

        let models = client(&server).list_models("key-1").await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id(), "gemini-2.0-flash");
    }
}
