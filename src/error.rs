//! Itinera Error Types
//!
//! Closed error taxonomy for the Gemini request manager and the travel call sites.

use std::time::Duration;
use thiserror::Error;

/// Substrings that mark an otherwise unclassified upstream message as quota related.
///
/// Only consulted when no structured status was available.
const RATE_LIMIT_MARKERS: [&str; 3] = ["429", "Quota exceeded", "Resource has been exhausted"];

/// Main error type for Itinera operations
#[derive(Debug, Error)]
pub enum ItineraError {
    /// No API keys configured at all
    #[error(
        "No Gemini API keys available. Set GEMINI_API_KEY, GEMINI_API_KEYS, or add `api_keys` to the config file"
    )]
    NoKeysAvailable,

    /// Configuration errors (invalid JSON, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied input that fails validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Quota or rate limit hit for a single key
    #[error("Rate limited on model '{model}' (status {status}): {message}")]
    RateLimited {
        model: String,
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Upstream rejected the request for a non-quota reason
    #[error("Gemini API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication failed for a reason unrelated to quota
    #[error("Authentication failed: {0}. Check your API key.")]
    Auth(String),

    /// HTTP transport failed
    #[error("Request failed: {0}")]
    Request(String),

    /// Attempt or dispatch deadline exceeded
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Caller cancelled the dispatch
    #[error("Request cancelled")]
    Cancelled,

    /// Every model in the fallback chain was tried with every key
    #[error(
        "All API keys and fallback models exhausted ({models:?}, {attempts} attempts). Last error: {last_error}"
    )]
    Exhausted {
        models: Vec<String>,
        attempts: usize,
        last_error: Box<ItineraError>,
    },

    /// Error inside an open stream
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Model output is not valid JSON after fence stripping
    #[error("Failed to parse model response: {message}. Text: {snippet}")]
    Parse { message: String, snippet: String },

    /// Model output parsed but lacks required content
    #[error("Invalid response structure: {0}")]
    InvalidResponse(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ItineraError {
    /// Whether the dispatcher may recover from this error by rotating keys.
    ///
    /// Structured `RateLimited` wins; an `Api` error is only treated as
    /// rate limiting when its status or message says so.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ItineraError::RateLimited { .. } => true,
            ItineraError::Api { status, message } => {
                *status == 429 || RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }

    /// Whether a caller-level fallback may replace this failure.
    ///
    /// Input validation and cancellation are never papered over.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            ItineraError::InvalidInput(_) | ItineraError::Cancelled
        )
    }
}

impl From<reqwest::Error> for ItineraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ItineraError::Timeout(err.to_string())
        } else if err.is_connect() {
            ItineraError::Request(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ItineraError::Stream(format!("Failed to decode response: {}", err))
        } else {
            ItineraError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ItineraError {
    fn from(err: serde_json::Error) -> Self {
        ItineraError::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Result type alias for Itinera operations
pub type Result<T> = std::result::Result<T, ItineraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_rate_limit() {
        let err = ItineraError::RateLimited {
            model: "gemini-2.0-flash".to_string(),
            status: 429,
            message: "slow down".to_string(),
            retry_after: None,
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_api_error_substring_fallback() {
        let quota = ItineraError::Api {
            status: 400,
            message: "Quota exceeded for quota metric".to_string(),
        };
        assert!(quota.is_rate_limited());

        let exhausted = ItineraError::Api {
            status: 500,
            message: "Resource has been exhausted (e.g. check quota).".to_string(),
        };
        assert!(exhausted.is_rate_limited());

        // matching is case-sensitive
        let lower = ItineraError::Api {
            status: 400,
            message: "quota exceeded".to_string(),
        };
        assert!(!lower.is_rate_limited());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(!ItineraError::Api {
            status: 400,
            message: "Invalid JSON payload".to_string()
        }
        .is_rate_limited());
        assert!(!ItineraError::Auth("API key not valid".to_string()).is_rate_limited());
        assert!(!ItineraError::Timeout("attempt".to_string()).is_rate_limited());
        assert!(!ItineraError::NoKeysAvailable.is_rate_limited());
    }

    #[test]
    fn test_exhausted_display_carries_last_error() {
        let err = ItineraError::Exhausted {
            models: vec!["a".to_string()],
            attempts: 2,
            last_error: Box::new(ItineraError::Api {
                status: 429,
                message: "Quota exceeded".to_string(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("2 attempts"));
        assert!(text.contains("Quota exceeded"));
    }

    #[test]
    fn test_allows_fallback() {
        assert!(ItineraError::NoKeysAvailable.allows_fallback());
        assert!(!ItineraError::InvalidInput("days".to_string()).allows_fallback());
        assert!(!ItineraError::Cancelled.allows_fallback());
    }
}
