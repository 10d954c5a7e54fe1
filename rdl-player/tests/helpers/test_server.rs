//! Router wrapper for API integration tests
//!
//! Builds the real router over shared state and a manager backed by a
//! `RecordingBackend`. Requests go through `tower::ServiceExt::oneshot`, so
//! no socket is bound.

use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use rdl_common::Lesson;
use rdl_player::api::{build_router, AppContext};
use rdl_player::playback::{spawn_event_pump, PlaybackManager, SharedManager};
use rdl_player::SharedState;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use super::RecordingBackend;

pub struct TestServer {
    router: Router,
    pub state: Arc<SharedState>,
    pub manager: SharedManager,
    pub backend: RecordingBackend,
}

impl TestServer {
    /// Server in the loading state, with the media event pump running
    pub fn start() -> Self {
        let state = Arc::new(SharedState::default());
        let backend = RecordingBackend::new();

        let (manager, events) = PlaybackManager::new(Arc::new(backend.clone()), state.event_bus());
        let manager: SharedManager = Arc::new(Mutex::new(manager));
        spawn_event_pump(Arc::clone(&manager), events);

        let router = build_router(AppContext {
            state: Arc::clone(&state),
            manager: Arc::clone(&manager),
            backend: "recording",
        });

        Self {
            router,
            state,
            manager,
            backend,
        }
    }

    /// Publish lessons and create their handles, as the startup load does
    pub async fn publish(&self, lessons: Vec<Lesson>) {
        self.state.publish_lessons(lessons).await;
        let lessons = self.state.lessons().await;
        self.manager.lock().await.ensure_handles(&lessons);
    }

    /// Send a request; the body is parsed as JSON when there is one
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.raw_request(method, path, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a request and return status, headers and raw body
    pub async fn raw_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, http::HeaderMap, Vec<u8>) {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, bytes)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(Method::POST, path, body).await
    }
}
