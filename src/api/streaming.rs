//! Streaming Support
//!
//! Chunk types for `streamGenerateContent` and Server-Sent Events (SSE) decoding.

use crate::api::request::{Content, FunctionCall};
use crate::error::{ItineraError, Result};
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// Boxed stream of decoded chunks, as produced by a transport
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentChunk>> + Send>>;

/// A streaming chunk from the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    /// Candidates with partial content
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Usage info (usually complete only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// Model version that served the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// A candidate in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Finish reason (set in final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,

    #[serde(default)]
    pub candidates_token_count: u32,

    #[serde(default)]
    pub total_token_count: u32,
}

impl GenerateContentChunk {
    /// Concatenated text of the first candidate; empty when the chunk has none
    pub fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls carried by the first candidate
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts()
            .filter_map(|p| p.function_call.clone())
            .collect()
    }

    /// Finish reason of the first candidate
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }

    fn parts(&self) -> impl Iterator<Item = &crate::api::request::Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .into_iter()
            .flatten()
    }
}

/// Error payload returned by the API, both as an HTTP body and inside a stream
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,

    #[serde(default)]
    pub message: String,

    /// Canonical status, e.g. `RESOURCE_EXHAUSTED`
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl ApiErrorBody {
    /// `retryDelay` from a `google.rpc.RetryInfo` detail, e.g. `"31s"`
    pub fn retry_delay(&self) -> Option<&str> {
        self.details
            .iter()
            .find_map(|d| d.get("retryDelay").and_then(|v| v.as_str()))
    }
}

/// Parse SSE data line into a chunk
pub fn parse_sse_line(line: &str) -> Result<Option<GenerateContentChunk>> {
    // Skip empty lines and comments
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        // Ignore other event fields (event:, id:, retry:)
        return Ok(None);
    };
    let data = data.trim();

    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(data) {
        return Err(ItineraError::Stream(format!(
            "upstream error in stream ({}): {}",
            envelope
                .error
                .status
                .as_deref()
                .unwrap_or("UNKNOWN"),
            envelope.error.message
        )));
    }

    let chunk: GenerateContentChunk = serde_json::from_str(data).map_err(|e| {
        ItineraError::Stream(format!("Failed to parse SSE chunk: {}. Data: {}", e, data))
    })?;

    Ok(Some(chunk))
}

pin_project! {
    /// A live generation stream together with the model that served it.
    pub struct GenerationStream {
        model: String,
        attempts: usize,
        #[pin]
        inner: ChunkStream,
    }
}

impl GenerationStream {
    pub fn new(model: impl Into<String>, attempts: usize, inner: ChunkStream) -> Self {
        Self {
            model: model.into(),
            attempts,
            inner,
        }
    }

    /// Model that accepted the request (may be a fallback)
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Transport calls made before this stream opened, including the successful one
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Stop reading once `cancel` fires; the last item is then `Err(Cancelled)`
    pub fn until_cancelled(self, cancel: CancellationToken) -> Self {
        let mut inner = self.inner;
        let guarded = async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = inner.next() => Some(next),
                };
                match next {
                    Some(Some(item)) => yield item,
                    Some(None) => break,
                    None => {
                        tracing::debug!("stream cancelled while reading");
                        yield Err(ItineraError::Cancelled);
                        break;
                    }
                }
            }
        };

        Self {
            model: self.model,
            attempts: self.attempts,
            inner: Box::pin(guarded),
        }
    }
}

impl Stream for GenerationStream {
    type Item = Result<GenerateContentChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("model", &self.model)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
