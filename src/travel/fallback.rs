//! Static payloads returned when generation fails.
//!
//! A [`FallbackProvider`] is consulted by the planner only after dispatch,
//! parsing or validation failed. Returning `None` lets the original error through.

use crate::travel::etiquette::{EtiquetteGuide, EtiquetteTip};
use crate::travel::itinerary::{Coordinates, Day, Interest, Itinerary, Place, PlanRequest};
use crate::travel::recommendations::Recommendation;
use chrono::{Duration, NaiveTime, Timelike};

/// Source of substitute results
pub trait FallbackProvider: Send + Sync {
    fn itinerary(&self, request: &PlanRequest) -> Option<Itinerary>;

    fn recommendations(&self, _city: &str, _category: Option<Interest>) -> Option<Vec<Recommendation>> {
        None
    }

    fn etiquette(&self, _city: &str) -> Option<EtiquetteGuide> {
        None
    }
}

/// Deterministic demo data for a handful of Indonesian cities
#[derive(Debug, Clone, Copy, Default)]
pub struct MockFallback;

struct MockPlace {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: Interest,
    /// Minutes
    duration: u32,
    d_lat: f64,
    d_lng: f64,
}

const MOCK_PLACES: &[MockPlace] = &[
    MockPlace {
        id: "nature-1",
        name: "Taman Nasional",
        description: "Beautiful natural park with diverse flora and fauna",
        category: Interest::Nature,
        duration: 120,
        d_lat: 0.01,
        d_lng: 0.01,
    },
    MockPlace {
        id: "nature-2",
        name: "Air Terjun",
        description: "Scenic waterfall perfect for nature lovers",
        category: Interest::Nature,
        duration: 90,
        d_lat: 0.02,
        d_lng: -0.01,
    },
    MockPlace {
        id: "culinary-1",
        name: "Restoran Tradisional",
        description: "Authentic local cuisine experience",
        category: Interest::Culinary,
        duration: 60,
        d_lat: -0.01,
        d_lng: 0.01,
    },
    MockPlace {
        id: "culinary-2",
        name: "Warung Makan",
        description: "Local street food experience",
        category: Interest::Culinary,
        duration: 90,
        d_lat: -0.02,
        d_lng: -0.01,
    },
    MockPlace {
        id: "culture-1",
        name: "Museum Sejarah",
        description: "Historical museum showcasing local heritage",
        category: Interest::Culture,
        duration: 90,
        d_lat: 0.015,
        d_lng: 0.015,
    },
    MockPlace {
        id: "culture-2",
        name: "Candi Kuno",
        description: "Ancient temple with rich cultural significance",
        category: Interest::Culture,
        duration: 120,
        d_lat: -0.015,
        d_lng: 0.02,
    },
    MockPlace {
        id: "history-1",
        name: "Situs Bersejarah",
        description: "Historical site with important cultural value",
        category: Interest::History,
        duration: 90,
        d_lat: 0.02,
        d_lng: -0.015,
    },
    MockPlace {
        id: "hidden-1",
        name: "Tempat Tersembunyi",
        description: "Off the beaten path destination",
        category: Interest::HiddenGem,
        duration: 120,
        d_lat: -0.02,
        d_lng: 0.02,
    },
];

/// Known city centers; anything else is placed around Jakarta
const CITY_CENTERS: &[(&str, f64, f64)] = &[
    ("Bali", -8.3405, 115.092),
    ("Bandung", -6.9175, 107.6191),
    ("Yogyakarta", -7.7956, 110.3695),
];
const DEFAULT_CENTER: (f64, f64) = (-6.2088, 106.8456);

/// Minutes between consecutive stops
const TRAVEL_MINUTES: i64 = 30;

pub fn city_center(city: &str) -> Coordinates {
    let city = city.trim();
    let (lat, lng) = CITY_CENTERS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(city))
        .map(|(_, lat, lng)| (*lat, *lng))
        .unwrap_or(DEFAULT_CENTER);
    Coordinates::new(lat, lng)
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Next free slot after a stop: its duration plus travel, skipping lunch
fn next_slot(start: NaiveTime, duration: u32) -> NaiveTime {
    let (next, _) =
        start.overflowing_add_signed(Duration::minutes(i64::from(duration) + TRAVEL_MINUTES));
    if next.hour() == 12 {
        hm(13, 0)
    } else {
        next
    }
}

/// Offset in [-0.025, 0.025) that differs per day and stop
fn spread(day: u32, index: usize, salt: u32) -> f64 {
    let n = (day * 31 + index as u32 * 17 + salt) % 50;
    f64::from(n) / 1000.0 - 0.025
}

impl MockFallback {
    pub fn new() -> Self {
        Self
    }

    fn places_for<'a>(interests: &'a [Interest]) -> impl Iterator<Item = &'static MockPlace> + 'a {
        interests
            .iter()
            .flat_map(|interest| MOCK_PLACES.iter().filter(move |p| p.category == *interest))
    }
}

impl FallbackProvider for MockFallback {
    fn itinerary(&self, request: &PlanRequest) -> Option<Itinerary> {
        let center = city_center(&request.city);
        let selected: Vec<&MockPlace> = Self::places_for(&request.interests).collect();
        let per_day = request.pace.activities_per_day();

        let days = (1..=request.days)
            .map(|day| {
                let mut clock = hm(9, 0);
                let places = selected
                    .iter()
                    .take(per_day)
                    .enumerate()
                    .map(|(i, template)| {
                        let place = Place {
                            id: format!("{}-day{}-{}", template.id, day, i),
                            name: template.name.to_string(),
                            description: template.description.to_string(),
                            category: template.category.to_string(),
                            time_slot: clock.format("%H:%M").to_string(),
                            duration: template.duration,
                            coordinates: center.offset(spread(day, i, 7), spread(day, i, 29)),
                            thumbnail: None,
                        };
                        clock = next_slot(clock, template.duration);
                        place
                    })
                    .collect();
                Day {
                    day_number: day,
                    date: None,
                    places,
                }
            })
            .collect();

        Some(Itinerary {
            city: request.city.trim().to_string(),
            total_days: request.days,
            pace: request.pace.to_string(),
            interests: request.interests.iter().map(|i| i.to_string()).collect(),
            eco_focus: request.eco_focus,
            map_center: Some(center),
            days,
        })
    }

    fn recommendations(&self, city: &str, category: Option<Interest>) -> Option<Vec<Recommendation>> {
        let center = city_center(city);
        let interests: Vec<Interest> = match category {
            Some(category) => vec![category],
            None => Interest::ALL.to_vec(),
        };

        let recs: Vec<Recommendation> = Self::places_for(&interests)
            .map(|p| Recommendation {
                id: p.id.to_string(),
                name: p.name.to_string(),
                description: p.description.to_string(),
                category: p.category.to_string(),
                coordinates: center.offset(p.d_lat, p.d_lng),
            })
            .collect();
        (!recs.is_empty()).then_some(recs)
    }

    fn etiquette(&self, city: &str) -> Option<EtiquetteGuide> {
        Some(etiquette_for(city))
    }
}

fn tips(items: &[(&str, &str)]) -> Vec<EtiquetteTip> {
    items
        .iter()
        .map(|(title, description)| EtiquetteTip::new(*title, *description))
        .collect()
}

fn etiquette_for(city: &str) -> EtiquetteGuide {
    match city.trim().to_ascii_lowercase().as_str() {
        "bali" => EtiquetteGuide {
            dos: tips(&[
                ("Wear Appropriate Clothing", "Cover shoulders and knees when visiting temples. Sarongs are often provided, but bringing your own shows respect."),
                ("Use Right Hand for Giving", "In Balinese culture, the left hand is considered impure. Always use your right hand when giving or receiving items."),
            ]),
            donts: tips(&[
                ("Don't Point with Index Finger", "Pointing with your index finger is considered rude. Use your thumb or whole hand instead."),
                ("Don't Step on Offerings", "Small offerings (canang sari) are placed on the ground daily. Be careful not to step on them."),
            ]),
            warnings: tips(&[
                ("Temple Etiquette", "Remove shoes before entering temples. Women should not enter during menstruation. Keep voices low and be respectful."),
            ]),
        },
        "bandung" => EtiquetteGuide {
            dos: tips(&[
                ("Respect Prayer Times", "During prayer times (especially Friday prayers), avoid loud activities. Many shops may close temporarily."),
                ("Greet with Salam", "Use \"Assalamu'alaikum\" when greeting locals. It shows respect for the predominantly Muslim community."),
            ]),
            donts: tips(&[
                ("Don't Eat in Public During Ramadan", "If visiting during Ramadan, avoid eating, drinking, or smoking in public during daylight hours out of respect."),
                ("Don't Wear Revealing Clothes", "Dress modestly, especially when visiting religious sites or traditional areas. Cover shoulders and knees."),
            ]),
            warnings: tips(&[
                ("Traffic Awareness", "Bandung traffic can be heavy. Be patient and use pedestrian crossings. Motorcycles are common, so stay alert."),
            ]),
        },
        "yogyakarta" => EtiquetteGuide {
            dos: tips(&[
                ("Respect Javanese Customs", "Yogyakarta is the heart of Javanese culture. Show respect for traditional customs and royal traditions."),
                ("Learn Basic Javanese Greetings", "Using \"Sugeng enjang\" (good morning) or \"Matur nuwun\" (thank you) is appreciated by locals."),
            ]),
            donts: tips(&[
                ("Don't Point Feet at People", "Feet are considered the lowest part of the body. Never point your feet toward people or sacred objects."),
                ("Don't Touch Heads", "The head is considered sacred. Avoid touching someone's head, even children's."),
            ]),
            warnings: tips(&[
                ("Kraton Palace Rules", "When visiting the Kraton Palace, dress modestly, speak quietly, and follow all posted rules. Photography may be restricted in certain areas."),
            ]),
        },
        _ => EtiquetteGuide {
            dos: tips(&[
                ("Respect Local Customs", "Take time to learn about local customs and traditions before visiting. This shows respect and helps you avoid unintentional offenses."),
                ("Dress Appropriately", "Research dress codes for religious sites and cultural areas. When in doubt, dress more conservatively."),
            ]),
            donts: tips(&[
                ("Don't Take Photos Without Permission", "Always ask before taking photos of people, especially in rural or traditional areas. Some may expect a small tip."),
                ("Don't Bargain Aggressively", "Bargaining is common in markets, but be respectful. Start at 50-70% of asking price and negotiate politely."),
            ]),
            warnings: tips(&[
                ("General Travel Etiquette", "Be patient, smile, and show genuine interest in local culture. A little effort goes a long way in building positive connections."),
            ]),
        },
    }
}
