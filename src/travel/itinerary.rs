//! Itinerary generation: plan input, output model, prompt and validation.

use crate::api::GenerationRequest;
use crate::error::{ItineraError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest trip the planner accepts
pub const MAX_DAYS: u32 = 10;

/// Travel pace, which drives how many stops a day gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pace {
    Relaxed,
    Moderate,
    #[serde(rename = "Fast-Paced")]
    FastPaced,
}

impl Pace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pace::Relaxed => "Relaxed",
            Pace::Moderate => "Moderate",
            Pace::FastPaced => "Fast-Paced",
        }
    }

    /// Stops per day used when no model is available
    pub fn activities_per_day(&self) -> usize {
        match self {
            Pace::Relaxed => 2,
            Pace::Moderate => 3,
            Pace::FastPaced => 5,
        }
    }

    /// Range of stops per day the model is asked for
    fn places_hint(&self) -> &'static str {
        match self {
            Pace::Relaxed => "2-3",
            Pace::Moderate => "3-4",
            Pace::FastPaced => "4-6",
        }
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pace {
    type Err = ItineraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(Pace::Relaxed),
            "moderate" => Ok(Pace::Moderate),
            "fast-paced" | "fast_paced" | "fastpaced" | "fast" => Ok(Pace::FastPaced),
            other => Err(ItineraError::InvalidInput(format!(
                "unknown pace '{}', expected Relaxed, Moderate or Fast-Paced",
                other
            ))),
        }
    }
}

/// Trip interest; doubles as the place category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interest {
    Nature,
    Culinary,
    Culture,
    History,
    #[serde(rename = "Hidden Gem")]
    HiddenGem,
}

impl Interest {
    pub const ALL: [Interest; 5] = [
        Interest::Nature,
        Interest::Culinary,
        Interest::Culture,
        Interest::History,
        Interest::HiddenGem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interest::Nature => "Nature",
            Interest::Culinary => "Culinary",
            Interest::Culture => "Culture",
            Interest::History => "History",
            Interest::HiddenGem => "Hidden Gem",
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interest {
    type Err = ItineraError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        Interest::ALL
            .into_iter()
            .find(|i| i.as_str().replace(' ', "").eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| {
                ItineraError::InvalidInput(format!(
                    "unknown interest '{}', expected one of Nature, Culinary, Culture, History, Hidden Gem",
                    s.trim()
                ))
            })
    }
}

/// What the traveller asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub city: String,
    pub days: u32,
    pub pace: Pace,
    pub interests: Vec<Interest>,
    #[serde(default)]
    pub eco_focus: bool,
}

impl PlanRequest {
    pub fn new(city: impl Into<String>, days: u32, pace: Pace, interests: Vec<Interest>) -> Self {
        Self {
            city: city.into(),
            days,
            pace,
            interests,
            eco_focus: false,
        }
    }

    pub fn with_eco_focus(mut self, eco_focus: bool) -> Self {
        self.eco_focus = eco_focus;
        self
    }

    /// Reject input the planner cannot serve
    pub fn validate(&self) -> Result<()> {
        if self.city.trim().is_empty() {
            return Err(ItineraError::InvalidInput("City is required".to_string()));
        }
        if self.days < 1 {
            return Err(ItineraError::InvalidInput(
                "Days must be at least 1".to_string(),
            ));
        }
        if self.days > MAX_DAYS {
            return Err(ItineraError::InvalidInput(format!(
                "Days cannot exceed {}",
                MAX_DAYS
            )));
        }
        if self.interests.is_empty() {
            return Err(ItineraError::InvalidInput(
                "At least one interest is required".to_string(),
            ));
        }
        Ok(())
    }

    fn interest_names(&self) -> Vec<&'static str> {
        self.interests.iter().map(Interest::as_str).collect()
    }

    /// Prompt asking for a JSON itinerary in the wire shape of [`Itinerary`]
    pub fn prompt(&self) -> String {
        let city = self.city.trim();
        let interests = self.interest_names();
        let interests_json =
            serde_json::to_string(&interests).unwrap_or_else(|_| "[]".to_string());
        let first_category = interests.first().copied().unwrap_or("Culture");
        let eco_line = if self.eco_focus {
            "Prioritize eco-friendly and sustainable options."
        } else {
            ""
        };

        format!(
            r#"You are an expert travel planner specializing in sustainable and eco-friendly tourism. Create a detailed {days}-day itinerary for {city}, Indonesia.

Requirements:
- Travel pace: {pace}
- Interests: {interest_list}
- {eco_line}
- Start each day at 09:00
- Include lunch break (12:00-13:00)
- Each place must have realistic coordinates (latitude and longitude) for {city}
- Duration should be realistic (in minutes)
- Time slots should be sequential and logical

For each day, create places that match the interests. Consider:
- Proximity between places (group nearby attractions)
- Realistic travel time between locations
- Opening hours and accessibility
- Sustainable travel options when ecoFocus is true

Return ONLY a valid JSON object with this exact structure (no markdown, no explanations, just JSON):
{{
  "city": "{city}",
  "totalDays": {days},
  "pace": "{pace}",
  "interests": {interests_json},
  "ecoFocus": {eco},
  "mapCenter": {{ "lat": <realistic latitude for {city}>, "lng": <realistic longitude for {city}> }},
  "days": [
    {{
      "dayNumber": 1,
      "places": [
        {{
          "id": "unique-id-1",
          "name": "Place Name",
          "description": "Brief description of the place",
          "category": "{first_category}",
          "timeSlot": "09:00",
          "duration": 120,
          "coordinates": {{ "lat": <realistic latitude>, "lng": <realistic longitude> }}
        }}
      ]
    }}
  ]
}}

Important:
- Use REAL place names and descriptions for {city}
- All time slots must be in "HH:MM" format
- Duration is in minutes
- Generate {days} days with {places_hint} places per day
- Return ONLY the JSON, no other text"#,
            days = self.days,
            city = city,
            pace = self.pace,
            interest_list = interests.join(", "),
            eco_line = eco_line,
            interests_json = interests_json,
            eco = self.eco_focus,
            first_category = first_category,
            places_hint = self.pace.places_hint(),
        )
    }

    /// Full request with the itinerary sampling settings
    pub fn generation_request(&self) -> GenerationRequest {
        GenerationRequest::from_prompt(self.prompt())
            .with_temperature(0.7)
            .with_sampling(40, 0.95)
            .with_max_output_tokens(4096)
            .with_json_output()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn offset(&self, d_lat: f64, d_lng: f64) -> Self {
        Self::new(self.lat + d_lat, self.lng + d_lng)
    }
}

/// One stop in a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// `HH:MM` or `HH:MM-HH:MM`
    #[serde(default)]
    pub time_slot: String,
    /// Minutes
    #[serde(default)]
    pub duration: u32,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub day_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub places: Vec<Place>,
}

/// A generated multi-day plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub city: String,
    pub total_days: u32,
    pub pace: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub eco_focus: bool,
    #[serde(default)]
    pub map_center: Option<Coordinates>,
    pub days: Vec<Day>,
}

impl Itinerary {
    pub fn place_count(&self) -> usize {
        self.days.iter().map(|d| d.places.len()).sum()
    }
}

/// Check a parsed itinerary and fill in missing place ids
pub(crate) fn validate_itinerary(mut itinerary: Itinerary) -> Result<Itinerary> {
    match itinerary.map_center {
        Some(center) if center.lat != 0.0 && center.lng != 0.0 => {}
        _ => {
            return Err(ItineraError::InvalidResponse(
                "missing mapCenter coordinates".to_string(),
            ))
        }
    }

    for day in &mut itinerary.days {
        let day_number = day.day_number;
        for (idx, place) in day.places.iter_mut().enumerate() {
            if place.id.trim().is_empty() {
                place.id = format!("{}-place-{}", day_number, idx + 1);
            }
        }
    }

    Ok(itinerary)
}
