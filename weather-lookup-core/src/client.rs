//! The network boundary: one HTTP GET per lookup, decoded into a [`WeatherReport`].

use std::{fmt::Debug, time::{Duration, Instant}};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::{error::FetchError, model::WeatherReport};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How much of each HTTP exchange gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpLogLevel {
    None,
    #[default]
    Basic,
    Body,
}

/// Unit system requested from the API. `Standard` is the API default (Kelvin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Standard,
    Metric,
    Imperial,
}

impl Units {
    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Standard => "K",
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    fn query_value(&self) -> Option<&'static str> {
        match self {
            Units::Standard => None,
            Units::Metric => Some("metric"),
            Units::Imperial => Some("imperial"),
        }
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "standard" => Ok(Units::Standard),
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(anyhow!(
                "Unknown unit system '{value}'. Supported: standard, metric, imperial."
            )),
        }
    }
}

/// Settings fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub log_level: HttpLogLevel,
    pub units: Units,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            log_level: HttpLogLevel::default(),
            units: Units::default(),
        }
    }
}

/// The two remote lookups the rest of the app relies on.
#[async_trait]
pub trait WeatherFetchClient: Send + Sync + Debug {
    async fn fetch_by_name(&self, name: &str, api_key: &str) -> Result<WeatherReport, FetchError>;

    async fn fetch_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        api_key: &str,
    ) -> Result<WeatherReport, FetchError>;
}

/// [`WeatherFetchClient`] backed by the OpenWeatherMap current-weather endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: Client,
    endpoint: Url,
    config: ClientConfig,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, config: ClientConfig) -> anyhow::Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("weather"))
            .with_context(|| format!("Invalid weather API base URL: {base_url}"))?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, endpoint, config })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn get(&self, mut params: Vec<(&str, String)>) -> Result<WeatherReport, FetchError> {
        if let Some(units) = self.config.units.query_value() {
            params.push(("units", units.to_string()));
        }

        let started = Instant::now();
        let res = self.http.get(self.endpoint.clone()).query(&params).send().await?;

        let status = res.status();
        let logged_url = redact_credential(res.url());
        let body = res.text().await?;

        if self.config.log_level != HttpLogLevel::None {
            tracing::info!(
                method = "GET",
                url = %logged_url,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Weather API request completed"
            );
        }
        if self.config.log_level == HttpLogLevel::Body {
            tracing::debug!(body = %body, "Weather API response body");
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        decode_report(&body)
    }
}

#[async_trait]
impl WeatherFetchClient for OpenWeatherClient {
    async fn fetch_by_name(&self, name: &str, api_key: &str) -> Result<WeatherReport, FetchError> {
        self.get(vec![("q", name.to_string()), ("appid", api_key.to_string())]).await
    }

    async fn fetch_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        api_key: &str,
    ) -> Result<WeatherReport, FetchError> {
        self.get(vec![
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("appid", api_key.to_string()),
        ])
        .await
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    icon: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    name: Option<String>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: String,
}

/// Decode a current-weather body. `main.temp` and `weather[0].icon` are required.
pub fn decode_report(body: &str) -> Result<WeatherReport, FetchError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)?;

    let condition = parsed.weather.into_iter().next().ok_or_else(|| {
        <serde_json::Error as serde::de::Error>::custom("`weather` array is empty")
    })?;

    Ok(WeatherReport {
        temperature: parsed.main.temp,
        humidity: parsed.main.humidity,
        description: condition.description.filter(|d| !d.is_empty()),
        icon: condition.icon,
        location_name: parsed.name.filter(|n| !n.is_empty()),
        observed_at: parsed.dt.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<OwErrorBody>(body) {
        Ok(err) => err.message,
        Err(_) => truncate_body(body),
    }
}

fn redact_credential(url: &Url) -> Url {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "appid" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
