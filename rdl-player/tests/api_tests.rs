//! Integration tests for the rdl-player HTTP API
//!
//! Drives the real router with `oneshot` over a recording media backend.

mod helpers;

use helpers::{lesson, HandleCall, TestServer};
use http::{header, Method, StatusCode};
use rdl_player::playback::MediaEventKind;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_health() {
    let server = TestServer::start();
    let (status, body) = server.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rdl-player");
    assert_eq!(body["backend"], "recording");
}

#[tokio::test]
async fn test_buildinfo() {
    let server = TestServer::start();
    let (status, body) = server.get("/api/buildinfo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["git_hash"].is_string());
}

#[tokio::test]
async fn test_index_page_and_script() {
    let server = TestServer::start();

    let (status, headers, body) = server.raw_request(Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert!(String::from_utf8(body).unwrap().contains("/static/app.js"));

    let (status, headers, body) = server.raw_request(Method::GET, "/static/app.js", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");

    // Releasing the slider without moving it must end the drag
    let script = String::from_utf8(body).unwrap();
    for event in ["pointerup", "pointercancel", "blur"] {
        assert!(script.contains(event), "script does not handle {}", event);
    }
}

#[tokio::test]
async fn test_lessons_while_loading() {
    let server = TestServer::start();
    let (status, body) = server.get("/api/lessons").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], true);
    assert!(body["error"].is_null());
    assert_eq!(body["lessons"], json!([]));
}

#[tokio::test]
async fn test_lessons_after_failed_load() {
    let server = TestServer::start();
    server.state.fail_load("HTTP error: connection refused".to_string()).await;

    let (_, body) = server.get("/api/lessons").await;
    assert_eq!(body["loading"], false);
    assert_eq!(body["error"], "HTTP error: connection refused");
    assert_eq!(body["lessons"], json!([]));
}

#[tokio::test]
async fn test_lessons_listing() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1), lesson(2, 2)]).await;

    let (status, body) = server.get("/api/lessons").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], false);

    let lessons = body["lessons"].as_array().unwrap();
    assert_eq!(lessons.len(), 2);
    assert_eq!(lessons[0]["lesson"]["id"], 1);
    assert_eq!(
        lessons[0]["lesson"]["audioUrl"],
        "https://cdn.example.com/lessons/1.mp3"
    );
    assert_eq!(lessons[0]["playback"]["playing"], false);
    assert_eq!(lessons[0]["playback"]["elapsed"], "00:00");
    assert_eq!(lessons[0]["playback"]["slider_max"], 100.0);
}

#[tokio::test]
async fn test_get_unknown_lesson() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1)]).await;

    let (status, body) = server.get("/api/lessons/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Lesson not found: 9");
}

#[tokio::test]
async fn test_toggle_switches_playing_lesson() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1), lesson(2, 2)]).await;

    let (status, body) = server.post("/api/lessons/1/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playing"], true);

    let (_, body) = server.post("/api/lessons/2/toggle", None).await;
    assert_eq!(body["lesson_id"], 2);
    assert_eq!(body["playing"], true);

    let (_, lesson1) = server.get("/api/lessons/1").await;
    assert_eq!(lesson1["playback"]["playing"], false);
    assert!(server.backend.calls_for(1).contains(&HandleCall::Pause(1)));

    let (_, body) = server.post("/api/lessons/2/toggle", None).await;
    assert_eq!(body["playing"], false);
}

#[tokio::test]
async fn test_slow_pause_does_not_stall_other_requests() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1), lesson(2, 2)]).await;
    server.post("/api/lessons/1/toggle", None).await;
    server.backend.slow_pause(Duration::from_millis(400));

    let started = Instant::now();
    let (toggled, health_elapsed) = tokio::join!(
        server.post("/api/lessons/2/toggle", None),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let (status, _) = server.get("/health").await;
            assert_eq!(status, StatusCode::OK);
            started.elapsed()
        }
    );

    assert_eq!(toggled.0, StatusCode::OK);
    assert_eq!(toggled.1["playing"], true);
    assert!(
        health_elapsed < Duration::from_millis(300),
        "health waited {:?}",
        health_elapsed
    );
}

#[tokio::test]
async fn test_toggle_unknown_lesson() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1)]).await;

    let (status, _) = server.post("/api/lessons/5/toggle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_seek_clamps_to_duration() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1)]).await;
    server
        .manager
        .lock()
        .await
        .handle_media_event(rdl_player::playback::MediaEvent {
            lesson_id: 1,
            kind: MediaEventKind::MetadataLoaded {
                duration_seconds: 120.0,
            },
        });

    let (status, body) = server
        .post("/api/lessons/1/seek", Some(json!({"position_seconds": 30.0})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress_seconds"], 30.0);
    assert_eq!(body["elapsed"], "00:30");

    let (_, body) = server
        .post("/api/lessons/1/seek", Some(json!({"position_seconds": 500.0})))
        .await;
    assert_eq!(body["progress_seconds"], 120.0);

    let (_, body) = server
        .post("/api/lessons/1/seek", Some(json!({"position_seconds": -3.0})))
        .await;
    assert_eq!(body["progress_seconds"], 0.0);
}

#[tokio::test]
async fn test_seek_rejects_malformed_body() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1)]).await;

    let (status, _) = server
        .post("/api/lessons/1/seek", Some(json!({"position": "soon"})))
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_download_redirects_to_audio() {
    let server = TestServer::start();
    server.publish(vec![lesson(4, 4)]).await;

    let (status, headers, _) = server
        .raw_request(Method::GET, "/api/lessons/4/download", None)
        .await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        headers[header::LOCATION],
        "https://cdn.example.com/lessons/4.mp3"
    );
}

#[tokio::test]
async fn test_handle_events_reach_lesson_view() {
    let server = TestServer::start();
    server.publish(vec![lesson(1, 1)]).await;

    server
        .backend
        .emit(1, MediaEventKind::MetadataLoaded { duration_seconds: 65.0 });

    // The pump task applies the event asynchronously
    let mut total = String::new();
    for _ in 0..50 {
        let (_, body) = server.get("/api/lessons/1").await;
        total = body["playback"]["total"].as_str().unwrap_or_default().to_string();
        if total == "01:05" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total, "01:05");
}
