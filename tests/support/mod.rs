//! Shared fixtures: a scripted in-memory transport and test sources

#![allow(dead_code)]

use async_trait::async_trait;
use chart_harvester::extract::{FieldMap, PayloadFormat};
use chart_harvester::fetcher::{FetchError, RawResponse, Transport};
use chart_harvester::harvest::{BackoffPolicy, HarvestExecutor, HarvestOptions, RetryPolicy};
use chart_harvester::registry::SourceSpec;
use chart_harvester::shutdown::ShutdownCoordinator;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Endpoint template of the test chart source
pub const CHART_ENDPOINT: &str = "https://charts.test/api/{category}?region={country}";

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this response
    Respond(RawResponse),
    /// Fail at the transport level
    Fail(FetchError),
    /// Hang for this long, then return an empty list
    Stall(Duration),
}

impl Step {
    pub fn status(code: u16) -> Self {
        Step::Respond(RawResponse::with_status(code))
    }

    pub fn rate_limited() -> Self {
        Step::Respond(RawResponse::rate_limited(None))
    }

    pub fn body(body: &str) -> Self {
        Step::Respond(RawResponse::ok(body))
    }
}

/// `{"items": [...]}` with one Spotify-style element per identifier
///
/// An empty identifier produces an element without `showUri`.
pub fn items(ids: &[&str]) -> Step {
    let items: Vec<_> = ids
        .iter()
        .map(|id| {
            if id.is_empty() {
                json!({ "showName": "Untitled" })
            } else {
                json!({
                    "showUri": format!("spotify:show:{id}"),
                    "showName": format!("Show {id}"),
                    "showPublisher": "Test Publisher",
                })
            }
        })
        .collect();
    Step::Respond(RawResponse::ok(json!({ "items": items }).to_string()))
}

/// Transport replaying per-URL scripts
///
/// Each URL consumes its steps in order; the last step repeats forever.
/// Unscripted URLs get the fallback step.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(fallback: Step) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, url: impl Into<String>, steps: Vec<Step>) -> Self {
        self.routes.lock().unwrap().insert(url.into(), steps.into());
        self
    }

    pub fn chart(self, country: &str, category: &str, steps: Vec<Step>) -> Self {
        self.route(chart_url(country, category), steps)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn next_step(&self, url: &str) -> Step {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| self.fallback.clone()),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<RawResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.next_step(url) {
            Step::Respond(response) => Ok(response),
            Step::Fail(error) => Err(error),
            Step::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(RawResponse::ok("[]"))
            }
        }
    }
}

pub fn chart_url(country: &str, category: &str) -> String {
    format!("https://charts.test/api/{category}?region={country}")
}

/// JSON chart source with the default field map and empty-result retries
pub fn chart_source() -> SourceSpec {
    SourceSpec::new("test-charts", CHART_ENDPOINT, PayloadFormat::Json)
        .with_fields(FieldMap::default())
        .with_retry_empty(true)
}

/// Options with no pacing, a short timeout and 1ms backoff
pub fn fast(options: HarvestOptions) -> HarvestOptions {
    options
        .with_task_delay(Duration::ZERO)
        .with_timeout(Duration::from_millis(200))
        .with_retry(RetryPolicy::default().with_backoff(BackoffPolicy::Fixed(Duration::from_millis(1))))
}

/// Executor over `transport` with a private shutdown coordinator
pub fn executor(transport: &Arc<ScriptedTransport>, options: HarvestOptions) -> HarvestExecutor {
    executor_for(&chart_source(), transport, options)
}

pub fn executor_for(source: &SourceSpec, transport: &Arc<ScriptedTransport>, options: HarvestOptions) -> HarvestExecutor {
    let transport: Arc<dyn Transport> = transport.clone();
    HarvestExecutor::with_transport(source, transport, options)
        .unwrap()
        .with_shutdown(ShutdownCoordinator::shared())
}
