//! The `GenerationTransport` trait -- the seam between the dispatcher and
//! the network.
//!
//! The dispatcher only needs "open a stream for this model with this key".
//! Production uses [`super::GeminiHttpClient`]; tests plug in scripted
//! transports.

use async_trait::async_trait;

use crate::api::{ChunkStream, GenerationRequest};
use crate::error::Result;

/// Opens one streaming generation call.
///
/// Implementations must report quota failures as
/// [`crate::ItineraError::RateLimited`] (or an `Api` error the classifier
/// recognizes) so the dispatcher can rotate keys. Every other error is
/// treated as fatal.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// Issue the request and return the live chunk stream once the upstream
    /// accepted it.
    async fn open_stream(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<ChunkStream>;
}

// The dispatcher stores `Arc<dyn GenerationTransport>`.
const _: () = {
    fn _assert_object_safe(_: &dyn GenerationTransport) {}
};
