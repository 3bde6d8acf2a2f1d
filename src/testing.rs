//! Scripted transport shared by unit tests.

use crate::api::{ChunkStream, GenerateContentChunk, GenerationRequest};
use crate::client::GenerationTransport;
use crate::error::{ItineraError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Outcome of one scripted transport call
pub(crate) enum Step {
    /// Open a stream carrying one text chunk
    Text(String),
    /// Open a stream carrying these chunks
    Chunks(Vec<GenerateContentChunk>),
    /// Structured 429
    RateLimited,
    /// Unstructured error whose message only hints at quota
    QuotaMessage,
    /// Fatal API error with this status
    Fail(u16),
    /// Open a stream carrying one text chunk that then never ends
    Stall(String),
    /// Never resolve
    Hang,
}

impl Step {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Step::Text(text.into())
    }
}

/// Plays back a fixed list of outcomes and records every call
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(String, String)>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// `(model, key)` per call, in order
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

/// A chunk with a single text part
pub(crate) fn text_chunk(text: &str) -> GenerateContentChunk {
    let value = serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    });
    serde_json::from_value(value).unwrap()
}

/// A chunk with one function call part
pub(crate) fn call_chunk(name: &str, args: serde_json::Value) -> GenerateContentChunk {
    let value = serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]}}]
    });
    serde_json::from_value(value).unwrap()
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<ChunkStream> {
        self.calls
            .lock()
            .push((model.to_string(), api_key.to_string()));
        self.requests.lock().push(request.clone());
        let step = self.steps.lock().pop_front();

        match step {
            Some(Step::Text(text)) => {
                let chunks = vec![Ok(text_chunk(&text))];
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
            Some(Step::Chunks(chunks)) => Ok(Box::pin(futures::stream::iter(
                chunks.into_iter().map(Ok).collect::<Vec<_>>(),
            ))),
            Some(Step::Stall(text)) => Ok(Box::pin(
                futures::stream::iter(vec![Ok(text_chunk(&text))])
                    .chain(futures::stream::pending()),
            )),
            Some(Step::RateLimited) => Err(ItineraError::RateLimited {
                model: model.to_string(),
                status: 429,
                message: "Resource has been exhausted (e.g. check quota).".to_string(),
                retry_after: None,
            }),
            Some(Step::QuotaMessage) => Err(ItineraError::Api {
                status: 500,
                message: "Quota exceeded for quota metric".to_string(),
            }),
            Some(Step::Fail(status)) => Err(ItineraError::Api {
                status,
                message: "Invalid JSON payload received.".to_string(),
            }),
            Some(Step::Hang) => futures::future::pending().await,
            None => Err(ItineraError::Internal("script exhausted".to_string())),
        }
    }
}
