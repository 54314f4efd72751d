//! Core library for the `weather-lookup` app.
//!
//! This crate defines:
//! - The weather data model (queries, reports)
//! - A fetch client for the OpenWeatherMap current-weather endpoint
//! - A repository that injects the API credential into every lookup
//! - A request controller that owns the observable request state
//! - Configuration and a small key-value store for the last searched city
//!
//! It is used by `weather-lookup-cli`, but can also drive any other front-end.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod repository;
pub mod store;

#[cfg(test)]
mod test_log;

pub use client::{ClientConfig, HttpLogLevel, OpenWeatherClient, Units, WeatherFetchClient};
pub use config::Config;
pub use controller::{Dispatch, Notification, OverlapPolicy, RequestState, WeatherController};
pub use error::{ErrorKind, FetchError};
pub use model::{QueryError, WeatherQuery, WeatherReport};
pub use repository::{WeatherRepository, repository_from_config};
pub use store::{FileStore, KeyValueStore, MemoryStore};
