//! Client Settings
//!
//! Defines the configuration schema for the Gemini client and its key pool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for the generative language API
    pub base_url: String,

    /// Optional environment variable overriding `base_url`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_env: Option<String>,

    /// Environment variable holding the primary API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Environment variable holding a comma separated list of keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys_list_env: Option<String>,

    /// Additional environment variables, one key each, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys_env: Vec<String>,

    /// Raw API keys (alternative to environment variables)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,

    /// Model used when a call site does not name one
    pub default_model: String,

    /// Primary model -> ordered degraded alternates
    pub fallback_chains: HashMap<String, Vec<String>>,

    /// Timeout for a single (model, key) attempt, 0 disables
    pub attempt_timeout_secs: u64,

    /// Budget for a whole dispatch across all attempts, 0 disables
    pub dispatch_timeout_secs: u64,

    /// TCP connect timeout for the HTTP client
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_base_env: Some("GEMINI_BASE_URL".to_string()),
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            api_keys_list_env: Some("GEMINI_API_KEYS".to_string()),
            api_keys_env: Vec::new(),
            api_keys: Vec::new(),
            default_model: "gemini-2.0-flash".to_string(),
            fallback_chains: HashMap::from([(
                "gemini-2.0-flash".to_string(),
                vec![
                    "gemini-2.0-flash-lite".to_string(),
                    "gemini-2.5-flash".to_string(),
                ],
            )]),
            attempt_timeout_secs: 60,
            dispatch_timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Get the effective base URL (from env var if configured, otherwise default)
    pub fn get_base_url(&self) -> String {
        if let Some(env_var) = &self.api_base_env {
            if let Ok(url) = std::env::var(env_var) {
                if !url.trim().is_empty() {
                    return url;
                }
            }
        }
        self.base_url.clone()
    }

    /// Resolve all API keys from the process environment and the config
    pub fn get_api_keys(&self) -> Vec<String> {
        self.resolve_api_keys_with(|name| std::env::var(name).ok())
    }

    /// Resolve API keys using a custom variable lookup.
    ///
    /// Order: primary variable, list variable, named variables, raw keys.
    /// Duplicates and blank values are dropped, first occurrence wins.
    pub fn resolve_api_keys_with<F>(&self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut keys: Vec<String> = Vec::new();
        let mut push = |key: &str| {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        };

        if let Some(value) = self.api_key_env.as_deref().and_then(&lookup) {
            push(&value);
        }

        if let Some(value) = self.api_keys_list_env.as_deref().and_then(&lookup) {
            for key in value.split(|c: char| c == ',' || c.is_whitespace()) {
                push(key);
            }
        }

        for env_var in &self.api_keys_env {
            if let Some(value) = lookup(env_var) {
                push(&value);
            }
        }

        for key in &self.api_keys {
            push(key);
        }

        keys
    }

    /// Per-attempt timeout, `None` when disabled
    pub fn attempt_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.attempt_timeout_secs)
    }

    /// Whole-dispatch timeout, `None` when disabled
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.dispatch_timeout_secs)
    }

    /// Connect timeout for the HTTP client
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
