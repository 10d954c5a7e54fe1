//! Lesson loader
//!
//! Fetches the lesson list once at startup. There is no retry: a failed
//! fetch leaves the list empty and records the error on shared state.

use rdl_common::config::TomlConfig;
use rdl_common::lesson::parse_lessons;
use rdl_common::Lesson;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::playback::SharedManager;
use crate::state::SharedState;

const USER_AGENT: &str = concat!("rdl-player/", env!("CARGO_PKG_VERSION"));

/// How a single load attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Lessons published
    Loaded(usize),
    /// Fetch or parse failed; list left empty
    Failed,
    /// Cancelled before the fetch resolved; state untouched
    Cancelled,
}

/// HTTP client for the lessons API
pub struct LessonLoader {
    http_client: reqwest::Client,
    endpoint: String,
}

impl LessonLoader {
    /// Create a loader for `endpoint`. `timeout` of None means no timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch and parse the lesson list.
    ///
    /// The body is read as text and parsed as JSON whatever content type the
    /// server claims. Lessons come back sorted by number.
    pub async fn fetch_lessons(&self) -> Result<Vec<Lesson>> {
        debug!(url = %self.endpoint, "Fetching lessons");

        let response = self
            .http_client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| rdl_common::Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(rdl_common::Error::Http(format!(
                "{} returned status {}",
                self.endpoint, status
            ))
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| rdl_common::Error::Http(e.to_string()))?;

        Ok(parse_lessons(&body)?)
    }

    /// Run the fetch once and publish its result to `state`.
    ///
    /// If `cancel` fires first the result is dropped and `state` stays as it
    /// was.
    pub async fn run_once(&self, state: &SharedState, cancel: &CancellationToken) -> LoadOutcome {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Lesson load cancelled");
                return LoadOutcome::Cancelled;
            }
            result = self.fetch_lessons() => result,
        };

        match result {
            Ok(lessons) => {
                let count = lessons.len();
                info!(url = %self.endpoint, count, "Loaded lessons");
                state.publish_lessons(lessons).await;
                LoadOutcome::Loaded(count)
            }
            Err(e) => {
                error!(url = %self.endpoint, "Failed to load lessons: {}", e);
                state.fail_load(e.to_string()).await;
                LoadOutcome::Failed
            }
        }
    }
}

/// Spawn the startup load, then create one audio handle per loaded lesson.
pub fn spawn_initial_load(
    loader: LessonLoader,
    state: Arc<SharedState>,
    manager: SharedManager,
    cancel: CancellationToken,
) -> JoinHandle<LoadOutcome> {
    tokio::spawn(async move {
        let outcome = loader.run_once(&state, &cancel).await;
        if let LoadOutcome::Loaded(_) = outcome {
            if cancel.is_cancelled() {
                return LoadOutcome::Cancelled;
            }
            let lessons = state.lessons().await;
            manager.lock().await.ensure_handles(&lessons);
        }
        outcome
    })
}
