//! Response Parser
//!
//! Turns model text into structured values. Parsing is strict on purpose:
//! a malformed payload is reported, never repaired or defaulted.

use crate::error::{ItineraError, Result};
use serde::de::DeserializeOwned;

/// Longest prefix of the offending text kept in a parse error
const SNIPPET_CHARS: usize = 200;

const FENCE: &str = "```";

/// Strip one leading fence line (```` ```json ```` or bare ```` ``` ````) and
/// one trailing fence, if present. Text without a fence is only trimmed.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        let rest = match rest.get(..4) {
            Some(label) if label.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = rest.trim_start();

        if let Some(body) = text.strip_suffix(FENCE) {
            text = body.trim_end();
        }
    }

    text
}

/// Parse model output as strict JSON after fence stripping
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let text = strip_code_fence(raw);
    serde_json::from_str(text).map_err(|e| {
        tracing::debug!(error = %e, chars = raw.len(), "model response is not valid JSON");
        ItineraError::Parse {
            message: e.to_string(),
            snippet: snippet(raw),
        }
    })
}

fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
