//! Client Module
//!
//! Upstream transport, HTTP implementation, and error classification.

pub mod classify;
pub mod http;
pub mod transport;

pub use classify::UpstreamFailure;
pub use http::{GeminiHttpClient, ModelInfo};
pub use transport::GenerationTransport;
