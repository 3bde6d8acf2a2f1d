//! Itinera - travel planning on top of Gemini
//!
//! A Gemini client that rotates across API keys and falls back across models
//! when quota runs out, plus the travel call sites built on it: itineraries,
//! place recommendations, etiquette guides and map routes.

use std::path::Path;
use std::sync::Arc;

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod router;
pub mod travel;

#[cfg(test)]
pub(crate) mod testing;

use api::{collect_text, GenerationRequest, GenerationStream};
use client::{GeminiHttpClient, GenerationTransport, ModelInfo};
use config::{ClientConfig, ConfigLoader};
use router::{DispatchLimits, Dispatcher, FallbackTable, KeyPool, KeyPoolStats};
use tokio_util::sync::CancellationToken;
use travel::TravelPlanner;

pub use error::{ItineraError, Result};

/// Entry point: configuration, key pool, transport and dispatcher wired together
pub struct ItineraClient {
    /// Loaded configuration
    config: ClientConfig,

    /// HTTP client, also used for model listing
    http: GeminiHttpClient,

    /// Shared dispatcher (owns the key pool)
    dispatcher: Arc<Dispatcher>,
}

impl ItineraClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        let loader = ConfigLoader::new()?;
        Self::from_config(loader.into_config()?)
    }

    /// Create a client with a custom config path
    pub fn with_config_path(path: impl AsRef<Path>) -> Result<Self> {
        let loader = ConfigLoader::from_path(path)?;
        Self::from_config(loader.into_config()?)
    }

    /// Create a client from a config object
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let http = GeminiHttpClient::new(
            config.get_base_url(),
            config.connect_timeout(),
            config.attempt_timeout(),
        )?;
        let transport: Arc<dyn GenerationTransport> = Arc::new(http.clone());
        Ok(Self::assemble(config, http, transport))
    }

    /// Create a client whose generation calls go through `transport`
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn GenerationTransport>,
    ) -> Result<Self> {
        let http = GeminiHttpClient::new(
            config.get_base_url(),
            config.connect_timeout(),
            config.attempt_timeout(),
        )?;
        Ok(Self::assemble(config, http, transport))
    }

    fn assemble(
        config: ClientConfig,
        http: GeminiHttpClient,
        transport: Arc<dyn GenerationTransport>,
    ) -> Self {
        let pool = Arc::new(KeyPool::new(config.get_api_keys()));
        if pool.is_empty() {
            tracing::warn!(
                "no Gemini API keys configured; every request will fail until a key is provided"
            );
        } else {
            tracing::info!(keys = pool.len(), "loaded Gemini API keys");
        }

        let limits = DispatchLimits {
            attempt_timeout: config.attempt_timeout(),
            dispatch_timeout: config.dispatch_timeout(),
        };
        let dispatcher = Dispatcher::new(
            pool,
            FallbackTable::new(config.fallback_chains.clone()),
            transport,
        )
        .with_limits(limits);

        Self {
            config,
            http,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Masked per-key counters and the cursor position
    pub fn pool_stats(&self) -> KeyPoolStats {
        self.dispatcher.pool().stats()
    }

    /// Travel call sites bound to `model` (or the default model)
    pub fn planner(&self, model: Option<&str>) -> TravelPlanner {
        TravelPlanner::new(
            self.dispatcher.clone(),
            model.unwrap_or(self.default_model()),
        )
    }

    /// Open a generation stream, rotating keys and models as needed
    pub async fn dispatch(
        &self,
        model: Option<&str>,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationStream> {
        let model = model.unwrap_or(self.default_model());
        self.dispatcher.dispatch(model, request, cancel).await
    }

    /// Send a plain prompt and collect the whole answer
    pub async fn generate_text(&self, model: Option<&str>, prompt: &str) -> Result<String> {
        let request = GenerationRequest::from_prompt(prompt);
        let stream = self
            .dispatch(model, &request, &CancellationToken::new())
            .await?;
        collect_text(stream).await
    }

    /// Models available to the key under the cursor
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let pool = self.dispatcher.pool();
        let key = pool.current().ok_or(ItineraError::NoKeysAvailable)?;
        self.http.list_models(key.value()).await
    }
}

impl std::fmt::Debug for ItineraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItineraClient")
            .field("default_model", &self.config.default_model)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, Step};

    /// Config that ignores the process environment
    fn isolated_config(keys: &[&str]) -> ClientConfig {
        ClientConfig {
            api_base_env: None,
            api_key_env: None,
            api_keys_list_env: None,
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_text_uses_fallback_chain() {
        let transport = ScriptedTransport::new(vec![
            Step::RateLimited,
            Step::text("Selamat datang"),
        ]);
        let client =
            ItineraClient::with_transport(isolated_config(&["only-key"]), transport.clone())
                .unwrap();

        let text = client.generate_text(None, "greet me").await.unwrap();
        assert_eq!(text, "Selamat datang");

        let models: Vec<String> = transport.calls().into_iter().map(|(m, _)| m).collect();
        assert_eq!(models, vec!["gemini-2.0-flash", "gemini-2.0-flash-lite"]);

        let stats = client.pool_stats();
        assert_eq!(stats.total_keys, 1);
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.keys[0].key, "...-key");
    }

    #[tokio::test]
    async fn test_empty_pool_fails_fast() {
        let transport = ScriptedTransport::new(vec![Step::text("unused")]);
        let client = ItineraClient::with_transport(isolated_config(&[]), transport.clone()).unwrap();

        assert!(matches!(
            client.generate_text(Some("gemini-2.5-flash"), "hi").await,
            Err(ItineraError::NoKeysAvailable)
        ));
        assert!(matches!(
            client.list_models().await,
            Err(ItineraError::NoKeysAvailable)
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_models_against_server() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta/models")
            .match_header("x-goog-api-key", "key-a")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"models/gemini-2.5-flash","supportedGenerationMethods":["generateContent"]}]}"#)
            .create_async()
            .await;

        let config = ClientConfig {
            base_url: server.url(),
            ..isolated_config(&["key-a"])
        };
        let client = ItineraClient::from_config(config).unwrap();

        let models = client.list_models().await.unwrap();
        assert_eq!(models[0].id(), "gemini-2.5-flash");
    }

    #[test]
    fn test_planner_model_selection() {
        let transport = ScriptedTransport::new(vec![]);
        let client = ItineraClient::with_transport(isolated_config(&["k"]), transport).unwrap();
        assert_eq!(client.planner(None).model(), "gemini-2.0-flash");
        assert_eq!(client.planner(Some("gemini-2.5-flash")).model(), "gemini-2.5-flash");
    }
}
