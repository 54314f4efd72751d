use std::sync::Arc;

use crate::{
    Config,
    client::{ClientConfig, OpenWeatherClient, WeatherFetchClient},
    error::FetchError,
    model::{WeatherQuery, WeatherReport},
};

/// Stateless façade over a [`WeatherFetchClient`] that attaches the API key to every call.
///
/// Cheap to clone and safe to share for the whole process.
#[derive(Debug, Clone)]
pub struct WeatherRepository {
    client: Arc<dyn WeatherFetchClient>,
    api_key: String,
}

impl WeatherRepository {
    pub fn new(client: Arc<dyn WeatherFetchClient>, api_key: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into() }
    }

    pub async fn fetch_by_city(&self, name: &str) -> Result<WeatherReport, FetchError> {
        tracing::debug!(city = %name, "Fetching weather by city");
        self.client.fetch_by_name(name, &self.api_key).await
    }

    pub async fn fetch_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<WeatherReport, FetchError> {
        tracing::debug!(latitude, longitude, "Fetching weather by coordinates");
        self.client.fetch_by_coordinates(latitude, longitude, &self.api_key).await
    }

    pub async fn fetch(&self, query: &WeatherQuery) -> Result<WeatherReport, FetchError> {
        match query {
            WeatherQuery::ByName { name } => self.fetch_by_city(name).await,
            WeatherQuery::ByCoordinate { latitude, longitude } => {
                self.fetch_by_coordinates(*latitude, *longitude).await
            }
        }
    }
}

/// Wire an OpenWeatherMap client and repository from config.
pub fn repository_from_config(config: &Config) -> anyhow::Result<WeatherRepository> {
    let api_key = config.api_key()?;

    let client_config = ClientConfig {
        log_level: config.http_log,
        units: config.units,
        ..ClientConfig::default()
    };
    let client = OpenWeatherClient::new(config.base_url(), client_config)?;

    Ok(WeatherRepository::new(Arc::new(client), api_key))
}
