//! API Key Pool Management
//!
//! Holds the ordered Gemini API keys and the shared rotation cursor.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single API key with usage tracking
#[derive(Debug)]
pub struct ApiKey {
    /// The actual API key value
    value: String,

    /// Attempts issued with this key
    attempts: AtomicU64,

    /// Attempts that opened a stream
    successes: AtomicU64,

    /// Attempts rejected for quota or rate limiting
    rate_limited: AtomicU64,
}

impl ApiKey {
    /// Create a new API key
    pub fn new(value: String) -> Self {
        Self {
            value,
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    /// Get the key value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Key rendered safely for logs: only the last four characters survive
    pub fn masked(&self) -> String {
        let tail: String = {
            let chars: Vec<char> = self.value.chars().collect();
            let start = chars.len().saturating_sub(4);
            chars[start..].iter().collect()
        };
        format!("...{}", tail)
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of this key's counters
    pub fn usage(&self) -> KeyUsage {
        KeyUsage {
            key: self.masked(),
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Ordered pool of API keys with a round-robin cursor.
///
/// The cursor is shared by every caller holding the pool. It is protected by
/// a mutex so it never leaves `0..len`, but concurrent dispatches interleave
/// their advances: rotation state is not isolated per request.
#[derive(Debug)]
pub struct KeyPool {
    /// Available keys, deduplicated, in configuration order
    keys: Vec<ApiKey>,

    /// Index of the key the next attempt will use
    cursor: Mutex<usize>,
}

impl KeyPool {
    /// Create a new key pool; blank and duplicate keys are dropped
    pub fn new(keys: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.trim().to_string();
            if !key.is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }

        Self {
            keys: unique.into_iter().map(ApiKey::new).collect(),
            cursor: Mutex::new(0),
        }
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the number of keys in the pool
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }

    /// The key under the cursor, without moving it
    pub fn current(&self) -> Option<&ApiKey> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = *self.cursor.lock();
        self.keys.get(idx)
    }

    /// Move the cursor to the next key, wrapping around
    pub fn advance(&self) -> usize {
        let len = self.keys.len();
        let mut cursor = self.cursor.lock();
        if len > 0 {
            *cursor = (*cursor + 1) % len;
        }
        *cursor
    }

    /// Iterate keys in configuration order
    pub fn keys(&self) -> impl Iterator<Item = &ApiKey> {
        self.keys.iter()
    }

    /// Get statistics about the pool
    pub fn stats(&self) -> KeyPoolStats {
        let keys: Vec<KeyUsage> = self.keys.iter().map(ApiKey::usage).collect();
        KeyPoolStats {
            total_keys: keys.len(),
            cursor: self.cursor(),
            total_attempts: keys.iter().map(|k| k.attempts).sum(),
            keys,
        }
    }
}

/// Counters for one key, with the key masked
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyUsage {
    pub key: String,
    pub attempts: u64,
    pub successes: u64,
    pub rate_limited: u64,
}

/// Statistics about a key pool
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyPoolStats {
    pub total_keys: usize,
    pub cursor: usize,
    pub total_attempts: u64,
    pub keys: Vec<KeyUsage>,
}
