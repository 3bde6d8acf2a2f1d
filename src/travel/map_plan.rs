//! Map route planning through function calling.
//!
//! The model answers only with `location` and `line` calls; each call becomes
//! one [`MapFeature`]. Coordinates arrive as strings or numbers.

use crate::api::{FunctionCall, FunctionCallingMode, FunctionDeclaration, GenerationRequest};
use crate::error::{ItineraError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LOCATION_FUNCTION: &str = "location";
pub const LINE_FUNCTION: &str = "line";

/// Sequence used for stops the model left unnumbered
const UNSEQUENCED: u32 = 99;

const SYSTEM_INSTRUCTION: &str = "## System Instructions for Map Planner
You are an AI travel assistant. Your goal is to create detailed, multi-stop travel itineraries.

WHEN GENERATING A TRIP (e.g., \"1 day in Bandung\", \"Trip to Tokyo\"):
1. Generate MULTIPLE locations (at least 3-5) that form a logical route.
2. Use the 'location' tool for EACH stop.
3. Use the 'line' tool to connect consecutive locations (e.g., Location 1 -> Location 2, Location 2 -> Location 3).
4. Assign a 'sequence' number to each location (1, 2, 3...).
5. Provide realistic 'time' (e.g., \"09:00 AM\") and 'duration' (e.g., \"2 hours\") for each stop.

IMPORTANT:
- Coordinates must be precise.
- You must ALWAYS use the provided tools. DO NOT reply with conversational text.
- If the user asks for a specific place, suggest nearby attractions to make it a complete trip.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A stop placed by the `location` function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLocation {
    pub name: String,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

/// A leg drawn by the `line` function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRoute {
    pub name: String,
    pub start: LatLng,
    pub end: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MapFeature {
    Location(MapLocation),
    Route(MapRoute),
}

/// Everything one route request produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapPlan {
    pub locations: Vec<MapLocation>,
    pub routes: Vec<MapRoute>,
}

impl MapPlan {
    /// Collect features from function calls. Unknown functions are skipped;
    /// a plan with no features at all is an error.
    pub fn from_calls(calls: &[FunctionCall], day_planner: bool) -> Result<Self> {
        let mut plan = MapPlan::default();
        for call in calls {
            match feature_from_call(call)? {
                Some(MapFeature::Location(location)) => plan.locations.push(location),
                Some(MapFeature::Route(route)) => plan.routes.push(route),
                None => {
                    tracing::debug!(function = %call.name, "ignoring undeclared function call");
                }
            }
        }

        if plan.is_empty() {
            return Err(ItineraError::InvalidResponse(
                "Could not generate any results. Try again.".to_string(),
            ));
        }
        if day_planner {
            plan.locations
                .sort_by_key(|l| l.sequence.unwrap_or(UNSEQUENCED));
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.routes.is_empty()
    }

    /// First stop, used to center a map
    pub fn center(&self) -> Option<LatLng> {
        self.locations.first().map(|l| LatLng {
            lat: l.lat,
            lng: l.lng,
        })
    }
}

fn location_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: LOCATION_FUNCTION.to_string(),
        description: Some("Geographic coordinates of a location.".to_string()),
        parameters: Some(json!({
            "type": "OBJECT",
            "properties": {
                "name": {"type": "STRING", "description": "Name of the location."},
                "description": {"type": "STRING", "description": "Description of the location."},
                "lat": {"type": "STRING", "description": "Latitude."},
                "lng": {"type": "STRING", "description": "Longitude."},
                "time": {"type": "STRING", "description": "Time of day."},
                "duration": {"type": "STRING", "description": "Duration of stay."},
                "sequence": {"type": "NUMBER", "description": "Order in itinerary."}
            },
            "required": ["name", "description", "lat", "lng"]
        })),
    }
}

fn line_declaration() -> FunctionDeclaration {
    let point = json!({
        "type": "OBJECT",
        "properties": {"lat": {"type": "STRING"}, "lng": {"type": "STRING"}}
    });
    FunctionDeclaration {
        name: LINE_FUNCTION.to_string(),
        description: Some("Connection route between locations.".to_string()),
        parameters: Some(json!({
            "type": "OBJECT",
            "properties": {
                "name": {"type": "STRING"},
                "start": point.clone(),
                "end": point,
                "transport": {"type": "STRING"},
                "travelTime": {"type": "STRING"}
            },
            "required": ["name", "start", "end"]
        })),
    }
}

/// Request forcing the model to answer with map function calls
pub fn route_request(prompt: &str, day_planner: bool) -> GenerationRequest {
    let prompt = if day_planner {
        format!("{} day trip itinerary", prompt.trim())
    } else {
        prompt.trim().to_string()
    };
    let instruction = format!(
        "{}\n\nDAY_PLANNER_MODE: {}",
        SYSTEM_INSTRUCTION, day_planner
    );

    GenerationRequest::from_prompt(prompt)
        .with_system_instruction(instruction)
        .with_temperature(0.5)
        .with_functions(
            vec![location_declaration(), line_declaration()],
            FunctionCallingMode::Any,
        )
}

/// Convert one function call; `Ok(None)` for functions this planner does not declare
pub fn feature_from_call(call: &FunctionCall) -> Result<Option<MapFeature>> {
    let args = &call.args;
    match call.name.as_str() {
        LOCATION_FUNCTION => Ok(Some(MapFeature::Location(MapLocation {
            name: string_arg(args, "name")?,
            description: optional_string(args, "description").unwrap_or_default(),
            lat: number_arg(args, "lat")?,
            lng: number_arg(args, "lng")?,
            time: optional_string(args, "time"),
            duration: optional_string(args, "duration"),
            sequence: args
                .get("sequence")
                .and_then(lenient_number)
                .filter(|n| *n >= 0.0)
                .map(|n| n as u32),
        }))),
        LINE_FUNCTION => Ok(Some(MapFeature::Route(MapRoute {
            name: string_arg(args, "name")?,
            start: point_arg(args, "start")?,
            end: point_arg(args, "end")?,
            transport: optional_string(args, "transport"),
            travel_time: optional_string(args, "travelTime"),
        }))),
        _ => Ok(None),
    }
}

fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn optional_string(args: &Value, field: &str) -> Option<String> {
    match args.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn string_arg(args: &Value, field: &str) -> Result<String> {
    optional_string(args, field).ok_or_else(|| {
        ItineraError::InvalidResponse(format!("function call is missing '{}'", field))
    })
}

fn number_arg(args: &Value, field: &str) -> Result<f64> {
    args.get(field)
        .and_then(lenient_number)
        .ok_or_else(|| {
            ItineraError::InvalidResponse(format!("function call has no numeric '{}'", field))
        })
}

fn point_arg(args: &Value, field: &str) -> Result<LatLng> {
    let point = args.get(field).ok_or_else(|| {
        ItineraError::InvalidResponse(format!("function call is missing '{}'", field))
    })?;
    Ok(LatLng {
        lat: number_arg(point, "lat")?,
        lng: number_arg(point, "lng")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_route_request_shape() {
        let req = route_request("Bandung", true);
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["contents"][0]["parts"][0]["text"], "Bandung day trip itinerary");
        assert_eq!(value["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(value["generationConfig"]["temperature"], 0.5);
        let names: Vec<&str> = value["tools"][0]["functionDeclarations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["location", "line"]);
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("DAY_PLANNER_MODE: true"));
    }

    #[test]
    fn test_location_with_string_coordinates() {
        let feature = feature_from_call(&call(
            "location",
            json!({"name": "Kraton", "description": "Sultan's palace", "lat": "-7.8053", "lng": "110.3642", "sequence": 2}),
        ))
        .unwrap()
        .unwrap();

        match feature {
            MapFeature::Location(loc) => {
                assert_eq!(loc.name, "Kraton");
                assert_eq!(loc.lat, -7.8053);
                assert_eq!(loc.lng, 110.3642);
                assert_eq!(loc.sequence, Some(2));
                assert_eq!(loc.time, None);
            }
            other => panic!("expected location, got {:?}", other),
        }
    }

    #[test]
    fn test_line_and_unknown_calls() {
        let line = feature_from_call(&call(
            "line",
            json!({"name": "Kraton to Taman Sari", "start": {"lat": "-7.8053", "lng": "110.3642"}, "end": {"lat": -7.8100, "lng": 110.3594}, "transport": "walk"}),
        ))
        .unwrap();
        assert!(matches!(line, Some(MapFeature::Route(ref r)) if r.end.lat == -7.81));

        assert!(feature_from_call(&call("weather", json!({}))).unwrap().is_none());
        assert!(feature_from_call(&call("location", json!({"name": "x", "lat": "north"}))).is_err());
    }

    #[test]
    fn test_plan_orders_by_sequence_in_planner_mode() {
        let calls = vec![
            call("location", json!({"name": "B", "description": "", "lat": 1, "lng": 1, "sequence": 2})),
            call("location", json!({"name": "Loose", "description": "", "lat": 3, "lng": 3})),
            call("location", json!({"name": "A", "description": "", "lat": 2, "lng": 2, "sequence": 1})),
        ];

        let plan = MapPlan::from_calls(&calls, true).unwrap();
        let names: Vec<&str> = plan.locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Loose"]);

        let plan = MapPlan::from_calls(&calls, false).unwrap();
        assert_eq!(plan.locations[0].name, "B");
        assert_eq!(plan.center(), Some(LatLng { lat: 1.0, lng: 1.0 }));
    }

    #[test]
    fn test_empty_plan_is_error() {
        assert!(matches!(
            MapPlan::from_calls(&[call("weather", json!({}))], false),
            Err(ItineraError::InvalidResponse(_))
        ));
    }
}
