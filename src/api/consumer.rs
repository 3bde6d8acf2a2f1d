//! Stream Consumption
//!
//! Two ways to read a generation stream: drain everything for batch callers,
//! or pull only the first chunk for interactive callers.

use crate::api::request::FunctionCall;
use crate::api::streaming::{GenerateContentChunk, UsageMetadata};
use crate::error::Result;
use futures::{Stream, StreamExt};

/// Accumulator for streaming chunks
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    /// Accumulated text, in arrival order
    pub text: String,

    /// Function calls, in arrival order
    pub function_calls: Vec<FunctionCall>,

    /// Finish reason from the last chunk that carried one
    pub finish_reason: Option<String>,

    /// Usage from the last chunk that carried it
    pub usage: Option<UsageMetadata>,

    /// Model version reported by the stream
    pub model_version: Option<String>,

    /// Number of chunks seen
    pub chunks: usize,
}

impl StreamAccumulator {
    /// Create a new accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming chunk
    pub fn process_chunk(&mut self, chunk: &GenerateContentChunk) {
        self.chunks += 1;

        if self.model_version.is_none() {
            self.model_version = chunk.model_version.clone();
        }

        if chunk.usage_metadata.is_some() {
            self.usage = chunk.usage_metadata.clone();
        }

        // Chunks without text contribute nothing
        self.text.push_str(&chunk.text());
        self.function_calls.extend(chunk.function_calls());

        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }
    }
}

/// Drain the whole stream into an accumulator.
///
/// The first error item aborts and is returned; already-read chunks are dropped.
pub async fn drain<S>(stream: S) -> Result<StreamAccumulator>
where
    S: Stream<Item = Result<GenerateContentChunk>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut acc = StreamAccumulator::new();

    while let Some(chunk) = stream.next().await {
        acc.process_chunk(&chunk?);
    }

    tracing::debug!(
        chunks = acc.chunks,
        chars = acc.text.len(),
        function_calls = acc.function_calls.len(),
        finish_reason = acc.finish_reason.as_deref().unwrap_or("-"),
        "stream drained"
    );
    Ok(acc)
}

/// Drain the stream and return the concatenated text
pub async fn collect_text<S>(stream: S) -> Result<String>
where
    S: Stream<Item = Result<GenerateContentChunk>>,
{
    Ok(drain(stream).await?.text)
}

/// Drain the stream and return the function calls in order
pub async fn collect_function_calls<S>(stream: S) -> Result<Vec<FunctionCall>>
where
    S: Stream<Item = Result<GenerateContentChunk>>,
{
    Ok(drain(stream).await?.function_calls)
}

/// Pull only the first chunk, leaving the rest of the stream unread.
///
/// `Ok(None)` means the stream ended without producing anything.
pub async fn peek_first<S>(stream: &mut S) -> Result<Option<GenerateContentChunk>>
where
    S: Stream<Item = Result<GenerateContentChunk>> + Unpin,
{
    stream.next().await.transpose()
}
