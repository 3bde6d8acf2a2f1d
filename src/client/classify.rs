//! Upstream Error Classification
//!
//! Maps a failed HTTP exchange onto the closed error taxonomy. Structured
//! signals (HTTP status, canonical status code) decide first; message
//! substrings are the last resort.

use crate::api::streaming::ApiErrorEnvelope;
use crate::error::ItineraError;
use reqwest::StatusCode;
use std::time::Duration;

/// Canonical status the API uses for quota exhaustion
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Message fragments that indicate quota problems when nothing structured does
const QUOTA_MARKERS: [&str; 3] = ["429", "Quota exceeded", "Resource has been exhausted"];

/// Failed response, decoded as far as the body allows
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFailure {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl UpstreamFailure {
    /// Decode a non-success response body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorEnvelope>(body) {
            Ok(envelope) => {
                let retry_after = envelope.error.retry_delay().and_then(parse_duration_string);
                Self {
                    status: envelope.error.code.unwrap_or(status.as_u16()),
                    code: envelope.error.status,
                    message: envelope.error.message,
                    retry_after,
                }
            }
            Err(_) => Self {
                status: status.as_u16(),
                code: None,
                message: if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("no response body")
                        .to_string()
                } else {
                    body.trim().to_string()
                },
                retry_after: None,
            },
        }
    }

    /// Whether this failure signals quota or rate limiting
    pub fn is_rate_limit(&self) -> bool {
        if self.status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            return true;
        }
        if self.code.as_deref() == Some(RESOURCE_EXHAUSTED) {
            return true;
        }
        QUOTA_MARKERS.iter().any(|m| self.message.contains(m))
    }

    /// Convert into the error the dispatcher classifies
    pub fn into_error(self, model: &str) -> ItineraError {
        if self.is_rate_limit() {
            return ItineraError::RateLimited {
                model: model.to_string(),
                status: self.status,
                message: self.message,
                retry_after: self.retry_after,
            };
        }

        match self.status {
            401 | 403 => ItineraError::Auth(self.message),
            status => ItineraError::Api {
                status,
                message: self.message,
            },
        }
    }
}

/// Parse a duration string like "31s", "1.5s", "1m30s" or "500ms"
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    // Handle milliseconds first
    if let Some(stripped) = s.strip_suffix("ms") {
        return stripped.parse::<u64>().ok().map(Duration::from_millis);
    }

    // Compound format (e.g., "1m30s", "2h30m")
    if s.contains('h') || (s.contains('m') && s.contains('s')) {
        let mut total_secs = 0u64;
        let mut current_num = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_num.push(c);
            } else if !current_num.is_empty() {
                let n = current_num.parse::<u64>().ok()?;
                let secs = match c {
                    'h' => n.checked_mul(3600)?,
                    'm' => n.checked_mul(60)?,
                    's' => n,
                    _ => 0,
                };
                total_secs = total_secs.checked_add(secs)?;
                current_num.clear();
            }
        }

        if total_secs > 0 {
            return Some(Duration::from_secs(total_secs));
        }
    }

    // Simple cases - single unit
    if let Some(stripped) = s.strip_suffix('s') {
        return stripped
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
    }
    if let Some(stripped) = s.strip_suffix('m') {
        return stripped
            .parse::<u64>()
            .ok()
            .and_then(|mins| mins.checked_mul(60))
            .map(Duration::from_secs);
    }

    None
}
