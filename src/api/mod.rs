//! API Module
//!
//! Gemini request types, streaming chunks, and stream consumption.

pub mod consumer;
pub mod request;
pub mod streaming;

pub use consumer::{
    collect_function_calls, collect_text, drain, peek_first, StreamAccumulator,
};
pub use request::{
    Content, FunctionCall, FunctionCallingMode, FunctionDeclaration, GenerationConfig,
    GenerationRequest, Part, Tool, ToolConfig,
};
pub use streaming::{
    parse_sse_line, ApiErrorBody, ApiErrorEnvelope, Candidate, ChunkStream,
    GenerateContentChunk, GenerationStream, UsageMetadata,
};
