//! Request controller: turns user intents into fetches and publishes the outcome.
//!
//! The controller is the only writer of [`RequestState`]. Readers either take a
//! snapshot with [`WeatherController::state`] or follow changes through the
//! `watch` receiver returned by [`WeatherController::subscribe`]. Failures are
//! additionally announced once on the [`Notification`] broadcast channel.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, watch},
    task::{AbortHandle, JoinHandle},
};

use crate::{
    error::FetchError,
    model::{WeatherQuery, WeatherReport},
    repository::WeatherRepository,
    store::{KeyValueStore, LAST_CITY_KEY},
};

const CITY_FAILURE: &str = "Failed to fetch weather data.";
const LOCATION_FAILURE: &str = "Failed to fetch weather data for location.";
const NOTIFICATION_CAPACITY: usize = 16;

/// What happens when an intent arrives while another request is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Run every request; whichever completes last overwrites the state.
    #[default]
    Concurrent,
    /// Abort the running request and discard its result.
    CancelPrevious,
    /// Drop new intents until the running request completes.
    IgnoreWhileLoading,
}

impl TryFrom<&str> for OverlapPolicy {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "concurrent" => Ok(OverlapPolicy::Concurrent),
            "cancel_previous" => Ok(OverlapPolicy::CancelPrevious),
            "ignore_while_loading" => Ok(OverlapPolicy::IgnoreWhileLoading),
            _ => Err(anyhow::anyhow!(
                "Unknown overlap policy '{value}'. \
                 Supported: concurrent, cancel-previous, ignore-while-loading."
            )),
        }
    }
}

/// Observable state of the most recent request cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    /// Survives failed requests; replaced only by a newer successful one.
    pub report: Option<WeatherReport>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// One-shot, user-facing message about a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
}

/// Outcome of handing an intent to the controller.
#[derive(Debug)]
pub enum Dispatch {
    Started(RequestHandle),
    Ignored,
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Dispatch::Started(_))
    }

    /// Wait for the request to finish. Returns immediately for ignored intents.
    pub async fn wait(self) {
        if let Dispatch::Started(handle) = self {
            handle.wait().await;
        }
    }
}

/// Handle to a running request. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct RequestHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl RequestHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the request has updated the state or was cancelled.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            if err.is_panic() {
                tracing::error!(request = self.id, "Weather request task panicked");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherController {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    repository: WeatherRepository,
    policy: OverlapPolicy,
    state: watch::Sender<RequestState>,
    notifications: broadcast::Sender<Notification>,
    // Only touched while holding the `state` lock.
    in_flight: AtomicUsize,
    latest: AtomicU64,
    current: Mutex<Option<(u64, AbortHandle)>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl WeatherController {
    pub fn new(
        repository: WeatherRepository,
        policy: OverlapPolicy,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                repository,
                policy,
                state,
                notifications,
                in_flight: AtomicUsize::new(0),
                latest: AtomicU64::new(0),
                current: Mutex::new(None),
                store,
            }),
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.inner.policy
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.inner.state.subscribe()
    }

    /// Failures published after this call are delivered to the returned receiver.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// The city most recently submitted through [`fetch_by_city`](Self::fetch_by_city).
    pub fn last_city(&self) -> Option<String> {
        self.inner.store.as_ref()?.get_string(LAST_CITY_KEY)
    }

    /// Look up weather for a city name. The name is passed through unchecked.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn fetch_by_city(&self, name: impl Into<String>) -> Dispatch {
        let name = name.into();
        let dispatch = self.dispatch(WeatherQuery::ByName { name: name.clone() });
        if dispatch.is_started() {
            self.remember_city(&name);
        }
        dispatch
    }

    /// Look up weather for a coordinate pair. Must be called from within a Tokio runtime.
    pub fn fetch_by_coordinates(&self, latitude: f64, longitude: f64) -> Dispatch {
        self.dispatch(WeatherQuery::ByCoordinate { latitude, longitude })
    }

    fn remember_city(&self, name: &str) {
        let Some(store) = &self.inner.store else { return };
        if name.trim().is_empty() {
            return;
        }
        if let Err(err) = store.set_string(LAST_CITY_KEY, name) {
            tracing::warn!(error = %err, "Failed to remember last city");
        }
    }

    fn dispatch(&self, query: WeatherQuery) -> Dispatch {
        let inner = &self.inner;
        let mut id = None;

        inner.state.send_if_modified(|state| {
            if inner.policy == OverlapPolicy::IgnoreWhileLoading
                && inner.in_flight.load(Ordering::SeqCst) > 0
            {
                return false;
            }
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            id = Some(inner.latest.fetch_add(1, Ordering::SeqCst) + 1);
            state.is_loading = true;
            state.error = None;
            true
        });

        let Some(id) = id else {
            tracing::debug!(query = %query, "Request already in flight, ignoring intent");
            return Dispatch::Ignored;
        };

        tracing::debug!(request = id, query = %query, "Dispatching weather request");

        let guard = InFlightGuard { inner: Arc::clone(inner), armed: true };
        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            let mut guard = guard;
            let result = task_inner.repository.fetch(&query).await;
            task_inner.complete(id, &query, result);
            guard.armed = false;
        });

        if inner.policy == OverlapPolicy::CancelPrevious {
            let mut current = lock(&inner.current);
            match current.as_ref() {
                // A newer dispatch already registered itself; this one is stale.
                Some((newest, _)) if *newest > id => task.abort(),
                _ => {
                    if let Some((previous, handle)) = current.replace((id, task.abort_handle())) {
                        tracing::debug!(request = previous, "Cancelling superseded request");
                        handle.abort();
                    }
                }
            }
        }

        Dispatch::Started(RequestHandle { id, task })
    }
}

impl Inner {
    fn complete(&self, id: u64, query: &WeatherQuery, result: Result<WeatherReport, FetchError>) {
        let mut outcome = Outcome::Discarded;

        self.state.send_modify(|state| {
            let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            state.is_loading = remaining > 0;

            if self.policy == OverlapPolicy::CancelPrevious
                && self.latest.load(Ordering::SeqCst) != id
            {
                return;
            }

            match result {
                Ok(report) => {
                    state.report = Some(report);
                    state.error = None;
                    outcome = Outcome::Applied;
                }
                Err(err) => {
                    state.error = Some(failure_message(query).to_string());
                    outcome = Outcome::Failed(err);
                }
            }
        });

        match outcome {
            Outcome::Discarded => {
                tracing::debug!(request = id, "Discarding response of superseded request");
            }
            Outcome::Applied => {
                tracing::info!(request = id, query = %query, "Weather request succeeded");
            }
            Outcome::Failed(err) => {
                tracing::warn!(request = id, query = %query, error = %err, "Weather request failed");
                // No receivers is fine: nobody is showing notifications.
                let _ = self.notifications.send(Notification { message: format!("Error: {err}") });
            }
        }
    }
}

enum Outcome {
    Applied,
    Failed(FetchError),
    Discarded,
}

fn failure_message(query: &WeatherQuery) -> &'static str {
    match query {
        WeatherQuery::ByName { .. } => CITY_FAILURE,
        WeatherQuery::ByCoordinate { .. } => LOCATION_FAILURE,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps the in-flight count honest when a request task is aborted before completing.
struct InFlightGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = &self.inner;
        inner.state.send_modify(|state| {
            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            state.is_loading = remaining > 0;
        });
    }
}
