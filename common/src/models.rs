use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Stable identifier of a city in the entity directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A city as published by the entity directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Entity {
    /// Coordinates, only when both latitude and longitude are known.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Normalized weather returned by a source, before the store stamps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Observation {
    pub temperature_c: f64,
    pub description: String,
    /// Relative humidity, 0-100
    pub humidity: f64,
}

/// Latest stored weather for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub entity_id: EntityId,
    pub temperature_c: f64,
    pub description: String,
    pub humidity: f64,
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    pub fn from_observation(
        entity_id: EntityId,
        observation: Observation,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id,
            temperature_c: observation.temperature_c,
            description: observation.description,
            humidity: observation.humidity,
            captured_at,
        }
    }

    pub fn temperature_f(&self) -> f64 {
        self.temperature_c * 9.0 / 5.0 + 32.0
    }
}

/// A city joined with its reading, as handed to presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CityReading {
    pub entity: Entity,
    pub reading: Reading,
}

/// Payload of the read endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingsResponse {
    pub readings: Vec<CityReading>,
    pub count: usize,
    /// Neutral notice shown when there is nothing to display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReadingsResponse {
    pub const NO_DATA: &'static str = "No weather data available";

    pub fn new(readings: Vec<CityReading>) -> Self {
        let count = readings.len();
        let message = readings.is_empty().then(|| Self::NO_DATA.to_string());
        Self {
            readings,
            count,
            message,
        }
    }
}

/// Outcome counters for one refresh pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RefreshSummary {
    pub pass_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_entities: usize,
    pub skipped_missing_coordinates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Result of asking for a refresh pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed(RefreshSummary),
    /// Another pass was already running; the trigger was dropped.
    Skipped,
}

/// Scheduler state as reported to administrators
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshStatus {
    pub running: bool,
    pub last_pass: Option<RefreshSummary>,
}

/// JWT claims accepted on admin routes
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(lat: Option<f64>, lon: Option<f64>) -> Entity {
        Entity {
            id: EntityId(1),
            name: "London".into(),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn coordinates_require_both_axes() {
        assert!(city(Some(51.5), Some(-0.1)).coordinates().is_some());
        assert!(city(Some(51.5), None).coordinates().is_none());
        assert!(city(None, Some(-0.1)).coordinates().is_none());
        assert!(city(None, None).coordinates().is_none());
    }

    #[test]
    fn coordinate_sanity() {
        let ok = Coordinates {
            latitude: -33.87,
            longitude: 151.21,
        };
        assert!(ok.is_valid());

        let out_of_range = Coordinates {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(!out_of_range.is_valid());

        let nan = Coordinates {
            latitude: f64::NAN,
            longitude: 0.0,
        };
        assert!(!nan.is_valid());
    }

    #[test]
    fn fahrenheit_is_derived_from_celsius() {
        let reading = Reading::from_observation(
            EntityId(1),
            Observation {
                temperature_c: 15.0,
                description: "Cloudy".into(),
                humidity: 70.0,
            },
            Utc::now(),
        );
        assert!((reading.temperature_f() - 59.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_response_carries_neutral_message() {
        let empty = ReadingsResponse::new(Vec::new());
        assert_eq!(empty.count, 0);
        assert_eq!(empty.message.as_deref(), Some(ReadingsResponse::NO_DATA));
    }

    #[test]
    fn entity_accepts_missing_coordinates() {
        let entity: Entity = serde_json::from_str(r#"{"id": 3, "name": "Nowhere"}"#).unwrap();
        assert_eq!(entity.id, EntityId(3));
        assert!(entity.coordinates().is_none());
    }

    #[test]
    fn pass_outcome_is_tagged() {
        let json = serde_json::to_value(PassOutcome::Skipped).unwrap();
        assert_eq!(json["status"], "skipped");
    }
}
