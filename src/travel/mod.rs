//! Travel Module
//!
//! Call sites that turn model output into itineraries, recommendations,
//! etiquette guides and map routes.

pub mod etiquette;
pub mod fallback;
pub mod itinerary;
pub mod map_plan;
pub mod recommendations;

pub use etiquette::{EtiquetteGuide, EtiquetteTip};
pub use fallback::{FallbackProvider, MockFallback};
pub use itinerary::{Coordinates, Day, Interest, Itinerary, Pace, Place, PlanRequest};
pub use map_plan::{LatLng, MapFeature, MapLocation, MapPlan, MapRoute};
pub use recommendations::Recommendation;

use crate::api::{collect_function_calls, collect_text, GenerationRequest};
use crate::error::{ItineraError, Result};
use crate::parser::parse_json;
use crate::router::Dispatcher;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Map features as they arrive from the model
pub type MapFeatureStream = Pin<Box<dyn Stream<Item = Result<MapFeature>> + Send>>;

/// Runs the travel call sites against a shared dispatcher
pub struct TravelPlanner {
    dispatcher: Arc<Dispatcher>,
    model: String,
    fallback: Option<Arc<dyn FallbackProvider>>,
    cancel: CancellationToken,
}

impl TravelPlanner {
    pub fn new(dispatcher: Arc<Dispatcher>, model: impl Into<String>) -> Self {
        Self {
            dispatcher,
            model: model.into(),
            fallback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Substitute provider data when generation fails
    pub fn with_fallback(mut self, provider: Arc<dyn FallbackProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Token that aborts in-flight dispatches and stream reads
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a day-by-day itinerary
    pub async fn generate_itinerary(&self, request: &PlanRequest) -> Result<Itinerary> {
        request.validate()?;

        let outcome = self
            .generate_json::<Itinerary>(request.generation_request())
            .await
            .and_then(itinerary::validate_itinerary);

        self.or_fallback("itinerary", outcome, |provider| provider.itinerary(request))
    }

    /// Recommend places in a city, optionally for one category
    pub async fn recommend_places(
        &self,
        city: &str,
        category: Option<Interest>,
    ) -> Result<Vec<Recommendation>> {
        require_city(city)?;

        let outcome = self
            .generate_json::<Vec<Recommendation>>(recommendations::recommendation_request(
                city, category,
            ))
            .await
            .and_then(recommendations::validate_recommendations);

        self.or_fallback("recommendations", outcome, |provider| {
            provider.recommendations(city, category)
        })
    }

    /// Local etiquette guide for a city
    pub async fn etiquette(&self, city: &str) -> Result<EtiquetteGuide> {
        require_city(city)?;

        let outcome = self
            .generate_json::<EtiquetteGuide>(etiquette::etiquette_request(city))
            .await
            .and_then(etiquette::validate_etiquette);

        self.or_fallback("etiquette", outcome, |provider| provider.etiquette(city))
    }

    /// Plan a route and wait for every feature
    pub async fn plan_route(&self, prompt: &str, day_planner: bool) -> Result<MapPlan> {
        let request = route_request(prompt, day_planner)?;
        let stream = self.dispatcher.dispatch(&self.model, &request, &self.cancel).await?;
        let calls = collect_function_calls(stream).await?;
        MapPlan::from_calls(&calls, day_planner)
    }

    /// Plan a route and yield features as the model emits them
    pub async fn stream_route(&self, prompt: &str, day_planner: bool) -> Result<MapFeatureStream> {
        let request = route_request(prompt, day_planner)?;
        let mut chunks = self.dispatcher.dispatch(&self.model, &request, &self.cancel).await?;

        let features = async_stream::stream! {
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for call in chunk.function_calls() {
                    match map_plan::feature_from_call(&call) {
                        Ok(Some(feature)) => yield Ok(feature),
                        Ok(None) => {}
                        Err(e) => yield Err(e),
                    }
                }
            }
        };
        Ok(Box::pin(features))
    }

    async fn generate_json<T: DeserializeOwned>(&self, request: GenerationRequest) -> Result<T> {
        let stream = self.dispatcher.dispatch(&self.model, &request, &self.cancel).await?;
        let served_by = stream.model().to_string();
        let text = collect_text(stream).await?;
        tracing::debug!(model = %served_by, chars = text.len(), "response collected");
        parse_json(&text)
    }

    fn or_fallback<T>(
        &self,
        operation: &str,
        outcome: Result<T>,
        substitute: impl FnOnce(&dyn FallbackProvider) -> Option<T>,
    ) -> Result<T> {
        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.allows_fallback() => return Err(err),
            Err(err) => err,
        };

        let replacement = match self.fallback.as_deref() {
            Some(provider) => substitute(provider),
            None => None,
        };
        match replacement {
            Some(value) => {
                tracing::warn!(operation, error = %err, "generation failed, using fallback data");
                Ok(value)
            }
            None => Err(err),
        }
    }
}

impl std::fmt::Debug for TravelPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TravelPlanner")
            .field("model", &self.model)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

fn require_city(city: &str) -> Result<()> {
    if city.trim().is_empty() {
        return Err(ItineraError::InvalidInput("City is required".to_string()));
    }
    Ok(())
}

fn route_request(prompt: &str, day_planner: bool) -> Result<GenerationRequest> {
    if prompt.trim().is_empty() {
        return Err(ItineraError::InvalidInput("Prompt is required".to_string()));
    }
    Ok(map_plan::route_request(prompt, day_planner))
}
