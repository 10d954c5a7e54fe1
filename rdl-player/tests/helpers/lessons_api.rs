//! Local HTTP server standing in for the remote lessons API

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::time::Duration;

/// Running lessons API; the server task lives as long as the test runtime
pub struct LessonsApi {
    pub base_url: String,
}

impl LessonsApi {
    /// Serve fixed responses:
    /// - `/lessons`: `body` as JSON
    /// - `/lessons-text`: `body` labeled `text/plain`
    /// - `/broken`: 500
    /// - `/slow`: `body` after 30 seconds
    pub async fn start(body: &str) -> Self {
        let json = body.to_string();
        let text = body.to_string();
        let slow = body.to_string();

        let app = Router::new()
            .route(
                "/lessons",
                get(move || {
                    let json = json.clone();
                    async move { ([(header::CONTENT_TYPE, "application/json")], json) }
                }),
            )
            .route(
                "/lessons-text",
                get(move || {
                    let text = text.clone();
                    async move { ([(header::CONTENT_TYPE, "text/plain")], text) }
                }),
            )
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
            )
            .route(
                "/slow",
                get(move || {
                    let slow = slow.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        slow
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// An address nothing listens on
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/lessons", addr)
}
