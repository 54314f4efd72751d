use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use inquire::{InquireError, Password, PasswordDisplayMode, Select, Text};
use tokio::sync::broadcast::{self, error::TryRecvError};
use weather_lookup_core::{
    Config, Dispatch, FileStore, KeyValueStore, Notification, OverlapPolicy, RequestState, Units,
    WeatherController, WeatherQuery, repository_from_config,
};

use crate::render::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-lookup", version, about = "Current weather by city or location")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and display preferences.
    Configure,

    /// Show weather for a city.
    City {
        /// City name; defaults to the last city searched.
        name: Option<String>,
    },

    /// Show weather for the current location, given as coordinates.
    #[command(allow_negative_numbers = true)]
    Locate {
        /// Latitude in degrees, -90..=90.
        latitude: f64,

        /// Longitude in degrees, -180..=180.
        longitude: f64,
    },

    /// Prompt for cities or "lat,lon" pairs until an empty line.
    Interactive,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Configure => {
                configure()?;
                Ok(ExitCode::SUCCESS)
            }
            Command::City { name } => {
                let config = Config::load()?;
                let controller = build_controller(&config)?;

                let name = match name {
                    Some(name) => name,
                    None => controller.last_city().ok_or_else(|| {
                        anyhow!("No city given and no previous search to repeat.")
                    })?,
                };
                let name = city_name(name)?;

                let state = follow(&controller, config.units, |c| c.fetch_by_city(name)).await;
                Ok(exit_code(&state))
            }
            Command::Locate { latitude, longitude } => {
                WeatherQuery::by_coordinate(latitude, longitude)?;

                let config = Config::load()?;
                let controller = build_controller(&config)?;

                let state = follow(&controller, config.units, |c| {
                    c.fetch_by_coordinates(latitude, longitude)
                })
                .await;
                Ok(exit_code(&state))
            }
            Command::Interactive => {
                let config = Config::load()?;
                let controller = build_controller(&config)?;
                interactive(&controller, config.units).await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn build_controller(config: &Config) -> anyhow::Result<WeatherController> {
    let repository = repository_from_config(config)?;

    let store: Option<Arc<dyn KeyValueStore>> = match FileStore::open_default() {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            tracing::warn!(error = %err, "Last-city memory unavailable");
            None
        }
    };

    Ok(WeatherController::new(repository, config.overlap, store))
}

fn exit_code(state: &RequestState) -> ExitCode {
    if state.error.is_some() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// Dispatch one intent and print every state change until it settles.
async fn follow(
    controller: &WeatherController,
    units: Units,
    intent: impl FnOnce(&WeatherController) -> Dispatch,
) -> RequestState {
    let mut states = controller.subscribe();
    let mut notifications = controller.notifications();

    let dispatch = intent(controller);
    if !dispatch.is_started() {
        println!("A lookup is already running; request ignored.");
    }

    loop {
        let state = states.borrow_and_update().clone();
        println!("{}", render(&state, units));
        if !state.is_loading || states.changed().await.is_err() {
            break;
        }
    }
    dispatch.wait().await;

    for message in drain_notifications(&mut notifications) {
        eprintln!("{message}");
    }

    controller.state()
}

/// Everything still queued, skipping past any gap left by a lagging receiver.
fn drain_notifications(notifications: &mut broadcast::Receiver<Notification>) -> Vec<String> {
    let mut messages = Vec::new();
    loop {
        match notifications.try_recv() {
            Ok(notification) => messages.push(notification.message),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notifications were dropped before they could be shown");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return messages,
        }
    }
}

/// Validate a city name; blank names never reach the controller.
fn city_name(input: String) -> anyhow::Result<String> {
    match WeatherQuery::by_name(input)? {
        WeatherQuery::ByName { name } => Ok(name),
        other => Err(anyhow!("Expected a city name, got {other}")),
    }
}

async fn interactive(controller: &WeatherController, units: Units) -> anyhow::Result<()> {
    loop {
        let placeholder = controller.last_city().unwrap_or_else(|| "London".to_string());
        let prompt = tokio::task::spawn_blocking(move || {
            Text::new("City or lat,lon (empty to quit):")
                .with_placeholder(&placeholder)
                .prompt()
        })
        .await
        .context("Prompt task failed")?;

        let input = match prompt {
            Ok(input) => input,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        match parse_location(input) {
            Ok(WeatherQuery::ByName { name }) => {
                follow(controller, units, |c| c.fetch_by_city(name)).await;
            }
            Ok(WeatherQuery::ByCoordinate { latitude, longitude }) => {
                follow(controller, units, |c| c.fetch_by_coordinates(latitude, longitude)).await;
            }
            Err(err) => eprintln!("{err}"),
        }
    }
}

/// Interpret "lat,lon" as coordinates and anything else as a city name.
fn parse_location(input: &str) -> anyhow::Result<WeatherQuery> {
    if let Some((lat, lon)) = input.split_once(',') {
        if let (Ok(latitude), Ok(longitude)) = (lat.trim().parse(), lon.trim().parse()) {
            return Ok(WeatherQuery::by_coordinate(latitude, longitude)?);
        }
    }

    Ok(WeatherQuery::by_name(input)?)
}

fn configure() -> anyhow::Result<()> {
    // Skip the environment override so it never ends up on disk.
    let path = Config::config_file_path()?;
    let mut config = Config::load_from(&path)?;

    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.api_key = Some(api_key.trim().to_string());
    }

    let units = Select::new("Units:", vec!["standard", "metric", "imperial"]).prompt()?;
    config.units = Units::try_from(units)?;

    let overlap = Select::new(
        "When a lookup starts while another is running:",
        vec!["concurrent", "cancel-previous", "ignore-while-loading"],
    )
    .prompt()?;
    config.overlap = OverlapPolicy::try_from(overlap)?;

    config.save_to(&path)?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_location_recognises_coordinates() {
        assert_eq!(
            parse_location("51.5, -0.12").unwrap(),
            WeatherQuery::ByCoordinate { latitude: 51.5, longitude: -0.12 }
        );
    }

    #[test]
    fn parse_location_falls_back_to_city() {
        assert_eq!(
            parse_location("Washington, D.C.").unwrap(),
            WeatherQuery::ByName { name: "Washington, D.C.".into() }
        );
    }

    #[test]
    fn parse_location_rejects_out_of_range_coordinates() {
        let err = parse_location("95,10").unwrap_err();
        assert!(err.to_string().contains("Latitude"));
    }

    #[test]
    fn locate_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["weather-lookup", "locate", "-33.9", "-151.2"]).unwrap();

        match cli.command {
            Command::Locate { latitude, longitude } => {
                assert_eq!(latitude, -33.9);
                assert_eq!(longitude, -151.2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = Cli::try_parse_from(["weather-lookup", "-vv", "city", "Oslo"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn city_name_trims_and_refuses_blank() {
        assert_eq!(city_name("  Oslo ".to_string()).unwrap(), "Oslo");

        let err = city_name(" \t".to_string()).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn drain_notifications_continues_past_lag() {
        let (tx, mut rx) = broadcast::channel(2);
        for n in 1..=5 {
            tx.send(Notification { message: format!("Error: {n}") }).unwrap();
        }

        assert_eq!(drain_notifications(&mut rx), vec!["Error: 4", "Error: 5"]);
        assert!(drain_notifications(&mut rx).is_empty());
    }
}
