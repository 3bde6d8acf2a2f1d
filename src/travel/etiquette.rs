//! Local etiquette guide for a city.

use crate::api::GenerationRequest;
use crate::error::{ItineraError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtiquetteTip {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl EtiquetteTip {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Do's, don'ts and warnings for visitors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtiquetteGuide {
    #[serde(default)]
    pub dos: Vec<EtiquetteTip>,
    #[serde(default)]
    pub donts: Vec<EtiquetteTip>,
    #[serde(default)]
    pub warnings: Vec<EtiquetteTip>,
}

impl EtiquetteGuide {
    /// Total number of tips across all sections
    pub fn len(&self) -> usize {
        self.dos.len() + self.donts.len() + self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn etiquette_request(city: &str) -> GenerationRequest {
    let city = city.trim();
    let prompt = format!(
        r#"You are a cultural guide for travellers visiting {city}, Indonesia.
List the most important local etiquette: things visitors should do, things they should avoid, and warnings about sacred sites, dress codes or safety.

Return ONLY a valid JSON object (no markdown, no explanations) with this exact structure:
{{
  "dos": [{{ "title": "Short title", "description": "One or two sentences" }}],
  "donts": [{{ "title": "Short title", "description": "One or two sentences" }}],
  "warnings": [{{ "title": "Short title", "description": "One or two sentences" }}]
}}

Give two to four entries per section, specific to {city}."#,
        city = city
    );

    GenerationRequest::from_prompt(prompt)
        .with_temperature(0.4)
        .with_json_output()
}

pub(crate) fn validate_etiquette(guide: EtiquetteGuide) -> Result<EtiquetteGuide> {
    if guide.is_empty() {
        return Err(ItineraError::InvalidResponse(
            "etiquette guide has no tips".to_string(),
        ));
    }
    Ok(guide)
}
