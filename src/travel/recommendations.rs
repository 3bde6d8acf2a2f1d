//! Place recommendations for a city, optionally narrowed to one category.

use crate::api::GenerationRequest;
use crate::error::{ItineraError, Result};
use crate::travel::itinerary::{Coordinates, Interest};
use serde::{Deserialize, Serialize};

/// Upper bound on recommendations requested from the model
const RECOMMENDATION_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub coordinates: Coordinates,
}

pub fn recommendation_request(city: &str, category: Option<Interest>) -> GenerationRequest {
    let city = city.trim();
    let focus = match category {
        Some(category) => format!("in the \"{}\" category", category),
        None => format!(
            "spread across these categories: {}",
            Interest::ALL.map(|i| i.as_str()).join(", ")
        ),
    };

    let prompt = format!(
        r#"Recommend up to {count} real places worth visiting in {city}, Indonesia, {focus}.

Return ONLY a valid JSON array (no markdown, no explanations) where every element has this structure:
{{
  "id": "short-unique-id",
  "name": "Place Name",
  "description": "One or two sentences about the place",
  "category": "Nature | Culinary | Culture | History | Hidden Gem",
  "coordinates": {{ "lat": <latitude>, "lng": <longitude> }}
}}

Coordinates must be accurate for {city}."#,
        count = RECOMMENDATION_COUNT,
        city = city,
        focus = focus,
    );

    GenerationRequest::from_prompt(prompt)
        .with_temperature(0.7)
        .with_json_output()
}

/// Reject empty lists and fill in missing ids
pub(crate) fn validate_recommendations(
    mut recommendations: Vec<Recommendation>,
) -> Result<Vec<Recommendation>> {
    if recommendations.is_empty() {
        return Err(ItineraError::InvalidResponse(
            "no recommendations returned".to_string(),
        ));
    }

    for (idx, rec) in recommendations.iter_mut().enumerate() {
        if rec.id.trim().is_empty() {
            rec.id = format!("rec-{}", idx + 1);
        }
    }
    Ok(recommendations)
}
