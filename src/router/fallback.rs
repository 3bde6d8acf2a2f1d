//! Model Fallback
//!
//! Maps a requested model to the ordered chain of models worth trying.

use std::collections::HashMap;

/// Ordered models for one dispatch, requested model first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFallbackChain {
    models: Vec<String>,
}

impl ModelFallbackChain {
    /// The model the caller asked for
    pub fn primary(&self) -> &str {
        &self.models[0]
    }

    /// All models in priority order
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Static lookup table of primary model -> degraded alternates
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    chains: HashMap<String, Vec<String>>,
}

impl FallbackTable {
    /// Create a table from configuration
    pub fn new(chains: HashMap<String, Vec<String>>) -> Self {
        Self { chains }
    }

    /// Register or replace the alternates for a primary model
    pub fn insert(&mut self, primary: impl Into<String>, alternates: Vec<String>) -> &mut Self {
        self.chains.insert(primary.into(), alternates);
        self
    }

    /// Build the chain for a requested model.
    ///
    /// Unknown models yield a singleton chain. Repeated names are kept once.
    pub fn chain_for(&self, requested: &str) -> ModelFallbackChain {
        let mut models = vec![requested.to_string()];
        if let Some(alternates) = self.chains.get(requested) {
            for alternate in alternates {
                if !models.contains(alternate) {
                    models.push(alternate.clone());
                }
            }
        }
        ModelFallbackChain { models }
    }
}
