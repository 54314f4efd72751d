use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ICON_BASE_URL: &str = "http://openweathermap.org/img/w";

/// What the user asked for: a place name or a coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    ByName { name: String },
    ByCoordinate { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("City name must not be empty")]
    EmptyName,

    #[error("Latitude {0} is outside the range -90..=90")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside the range -180..=180")]
    LongitudeOutOfRange(f64),
}

impl WeatherQuery {
    /// Build a name query, refusing blank input.
    pub fn by_name(name: impl Into<String>) -> Result<Self, QueryError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(QueryError::EmptyName);
        }

        Ok(WeatherQuery::ByName { name: trimmed.to_string() })
    }

    /// Build a coordinate query, refusing values outside the WGS84 ranges.
    pub fn by_coordinate(latitude: f64, longitude: f64) -> Result<Self, QueryError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(QueryError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(QueryError::LongitudeOutOfRange(longitude));
        }

        Ok(WeatherQuery::ByCoordinate { latitude, longitude })
    }
}

impl std::fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherQuery::ByName { name } => f.write_str(name),
            WeatherQuery::ByCoordinate { latitude, longitude } => {
                write!(f, "{latitude},{longitude}")
            }
        }
    }
}

/// A single decoded "current weather" observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// In the unit system the client was configured with.
    pub temperature: f64,
    pub humidity: Option<u8>,
    pub description: Option<String>,
    pub icon: String,
    pub location_name: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl WeatherReport {
    pub fn icon_url(&self) -> String {
        format!("{ICON_BASE_URL}/{}.png", self.icon)
    }
}
