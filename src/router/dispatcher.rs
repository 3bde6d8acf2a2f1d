//! Request Dispatcher
//!
//! Runs one generation request across the fallback chain and the key pool.
//! Rate-limited attempts rotate to the next key, then to the next model once
//! every key was tried; any other failure aborts the dispatch as-is.

use crate::api::{ChunkStream, GenerationRequest, GenerationStream};
use crate::client::GenerationTransport;
use crate::error::{ItineraError, Result};
use crate::router::fallback::FallbackTable;
use crate::router::key_pool::KeyPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Time bounds for a dispatch; `None` disables a bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Bound on a single transport call
    pub attempt_timeout: Option<Duration>,

    /// Bound on the whole rotation
    pub dispatch_timeout: Option<Duration>,
}

/// Retry-rotation engine over models x keys
pub struct Dispatcher {
    pool: Arc<KeyPool>,
    fallbacks: FallbackTable,
    transport: Arc<dyn GenerationTransport>,
    limits: DispatchLimits,
}

impl Dispatcher {
    /// Create a dispatcher without time bounds
    pub fn new(
        pool: Arc<KeyPool>,
        fallbacks: FallbackTable,
        transport: Arc<dyn GenerationTransport>,
    ) -> Self {
        Self {
            pool,
            fallbacks,
            transport,
            limits: DispatchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DispatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The shared key pool
    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Open a generation stream for `requested_model`, falling back as needed.
    ///
    /// The request is never modified; only the model and the key vary
    /// between attempts. The returned stream records which model served it
    /// and ends with `Cancelled` if `cancel` fires while it is being read.
    pub async fn dispatch(
        &self,
        requested_model: &str,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationStream> {
        if self.pool.is_empty() {
            return Err(ItineraError::NoKeysAvailable);
        }

        match self.limits.dispatch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.rotate(requested_model, request, cancel))
                .await
                .map_err(|_| {
                    tracing::warn!(model = requested_model, ?limit, "dispatch deadline exceeded");
                    ItineraError::Timeout(format!(
                        "dispatch for '{}' exceeded {:?}",
                        requested_model, limit
                    ))
                })?,
            None => self.rotate(requested_model, request, cancel).await,
        }
    }

    async fn rotate(
        &self,
        requested_model: &str,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationStream> {
        let chain = self.fallbacks.chain_for(requested_model);
        let mut attempts = 0usize;
        let mut last_error: Option<ItineraError> = None;

        for model in chain.models() {
            for _ in 0..self.pool.len() {
                if cancel.is_cancelled() {
                    return Err(ItineraError::Cancelled);
                }

                let Some(key) = self.pool.current() else {
                    return Err(ItineraError::NoKeysAvailable);
                };
                attempts += 1;
                key.record_attempt();

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(model = %model, key = %key.masked(), "dispatch cancelled mid-attempt");
                        return Err(ItineraError::Cancelled);
                    }
                    outcome = self.attempt(model, key.value(), request) => outcome,
                };

                match outcome {
                    Ok(inner) => {
                        key.record_success();
                        self.pool.advance();
                        if model != requested_model {
                            tracing::info!(
                                requested = requested_model,
                                served_by = %model,
                                attempts,
                                "request served by fallback model"
                            );
                        }
                        return Ok(GenerationStream::new(model.clone(), attempts, inner)
                            .until_cancelled(cancel.clone()));
                    }
                    Err(err) if err.is_rate_limited() => {
                        key.record_rate_limited();
                        let next = self.pool.advance();
                        tracing::warn!(
                            model = %model,
                            key = %key.masked(),
                            attempt = attempts,
                            next_key = next,
                            error = %err,
                            "rate limited, rotating to next key"
                        );
                        last_error = Some(err);
                    }
                    Err(err) => {
                        tracing::warn!(
                            model = %model,
                            key = %key.masked(),
                            attempt = attempts,
                            error = %err,
                            "request failed with non-retryable error"
                        );
                        return Err(err);
                    }
                }
            }

            tracing::warn!(
                model = %model,
                keys = self.pool.len(),
                "every key rate limited for model"
            );
        }

        Err(ItineraError::Exhausted {
            models: chain.models().to_vec(),
            attempts,
            last_error: Box::new(last_error.unwrap_or(ItineraError::NoKeysAvailable)),
        })
    }

    async fn attempt(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<ChunkStream> {
        let call = self.transport.open_stream(model, api_key, request);
        match self.limits.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ItineraError::Timeout(format!("attempt on '{}' exceeded {:?}", model, limit))
            })?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.pool.len())
            .field("fallbacks", &self.fallbacks)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::collect_text;
    use crate::testing::{ScriptedTransport, Step};
    use std::collections::HashMap;
    use std::time::Instant;

    fn pool(keys: &[&str]) -> Arc<KeyPool> {
        Arc::new(KeyPool::new(keys.iter().map(|k| k.to_string()).collect()))
    }

    fn table() -> FallbackTable {
        let mut chains = HashMap::new();
        chains.insert("primary".to_string(), vec!["alt1".to_string()]);
        FallbackTable::new(chains)
    }

    fn dispatcher(keys: &[&str], transport: Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(pool(keys), table(), transport)
    }

    fn call(model: &str, key: &str) -> (String, String) {
        (model.to_string(), key.to_string())
    }

    #[tokio::test]
    async fn test_single_model_exhausts_every_key_once() {
        let transport = ScriptedTransport::new(vec![
            Step::RateLimited,
            Step::RateLimited,
            Step::RateLimited,
        ]);
        let dispatcher = dispatcher(&["k1", "k2", "k3"], transport.clone());

        let err = dispatcher
            .dispatch("solo", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ItineraError::Exhausted {
                models,
                attempts,
                last_error,
            } => {
                assert_eq!(models, vec!["solo".to_string()]);
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, ItineraError::RateLimited { .. }));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(
            transport.calls(),
            vec![call("solo", "k1"), call("solo", "k2"), call("solo", "k3")]
        );
        assert_eq!(dispatcher.pool().cursor(), 0);
    }

    #[tokio::test]
    async fn test_rotation_wraps_from_mid_pool_cursor() {
        let transport = ScriptedTransport::new(vec![
            Step::RateLimited,
            Step::RateLimited,
            Step::RateLimited,
            Step::text("ok"),
        ]);
        let dispatcher = dispatcher(&["k1", "k2", "k3"], transport.clone());
        dispatcher.pool().advance();
        assert_eq!(dispatcher.pool().cursor(), 1);

        let stream = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.model(), "alt1");
        assert_eq!(
            transport.calls(),
            vec![
                call("primary", "k2"),
                call("primary", "k3"),
                call("primary", "k1"),
                call("alt1", "k2"),
            ]
        );
        // Advanced once more by the success on alt1
        assert_eq!(dispatcher.pool().cursor(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_cursor_to_start() {
        let transport = ScriptedTransport::new((0..3).map(|_| Step::RateLimited).collect());
        let dispatcher = dispatcher(&["k1", "k2", "k3"], transport.clone());
        dispatcher.pool().advance();

        let err = dispatcher
            .dispatch("solo", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::Exhausted { attempts: 3, .. }));
        let keys: Vec<String> = transport.calls().into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["k2", "k3", "k1"]);
        assert_eq!(dispatcher.pool().cursor(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_makes_no_calls() {
        let transport = ScriptedTransport::new(vec![Step::text("unused")]);
        let dispatcher = dispatcher(&[], transport.clone());

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::NoKeysAvailable));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_without_rotation() {
        let transport = ScriptedTransport::new(vec![Step::Fail(400), Step::text("unused")]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone());

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ItineraError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid JSON payload received.");
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert_eq!(transport.calls(), vec![call("primary", "k1")]);
        assert_eq!(dispatcher.pool().cursor(), 0);
    }

    #[tokio::test]
    async fn test_rotation_is_cyclic_across_models() {
        let transport = ScriptedTransport::new((0..6).map(|_| Step::RateLimited).collect());
        let dispatcher = dispatcher(&["k1", "k2", "k3"], transport.clone());

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::Exhausted { attempts: 6, .. }));
        let keys: Vec<String> = transport.calls().into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3", "k1", "k2", "k3"]);
        assert_eq!(keys[3], keys[0]);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let transport = ScriptedTransport::new(vec![
            Step::RateLimited,
            Step::RateLimited,
            Step::text("{\"ok\": true}"),
        ]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone());

        let stream = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.model(), "alt1");
        assert_eq!(stream.attempts(), 3);
        assert_eq!(
            transport.calls(),
            vec![
                call("primary", "k1"),
                call("primary", "k2"),
                call("alt1", "k1"),
            ]
        );
        assert_eq!(dispatcher.pool().cursor(), 1);
        assert_eq!(collect_text(stream).await.unwrap(), "{\"ok\": true}");

        let stats = dispatcher.pool().stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.keys[0].rate_limited, 1);
        assert_eq!(stats.keys[0].successes, 1);
        assert_eq!(stats.keys[1].rate_limited, 1);
    }

    #[tokio::test]
    async fn test_cursor_carries_over_between_dispatches() {
        let transport = ScriptedTransport::new(vec![Step::text("a"), Step::text("b")]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone());
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            dispatcher
                .dispatch("primary", &GenerationRequest::from_prompt("hi"), &cancel)
                .await
                .unwrap();
        }

        assert_eq!(
            transport.calls(),
            vec![call("primary", "k1"), call("primary", "k2")]
        );
    }

    #[tokio::test]
    async fn test_quota_message_is_rotated() {
        let transport = ScriptedTransport::new(vec![Step::QuotaMessage, Step::text("ok")]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone());

        let stream = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.model(), "primary");
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let transport = ScriptedTransport::new(vec![Step::text("unused")]);
        let dispatcher = dispatcher(&["k1"], transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::Cancelled));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inflight_attempt() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_fatal() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::text("unused")]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone()).with_limits(DispatchLimits {
            attempt_timeout: Some(Duration::from_millis(50)),
            dispatch_timeout: None,
        });

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ItineraError::Timeout(_)));
        assert_eq!(transport.calls(), vec![call("primary", "k1")]);
    }

    #[tokio::test]
    async fn test_dispatch_deadline() {
        let transport = ScriptedTransport::new(vec![Step::RateLimited, Step::Hang]);
        let dispatcher = dispatcher(&["k1", "k2"], transport.clone()).with_limits(DispatchLimits {
            attempt_timeout: None,
            dispatch_timeout: Some(Duration::from_millis(50)),
        });

        let err = dispatcher
            .dispatch("primary", &GenerationRequest::from_prompt("hi"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ItineraError::Timeout(msg) => assert!(msg.contains("primary")),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(transport.calls().len(), 2);
    }
}
