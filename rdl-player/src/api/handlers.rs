//! HTTP request handlers
//!
//! Lesson views, playback control, health and build info.

use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use rdl_common::Lesson;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::api::server::AppContext;
use crate::error::{Error, Result};
use crate::playback::{PlaybackManager, PlaybackView};
use crate::state::LoadStatus;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Media backend in use ("device" or "null")
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

/// One lesson card: the lesson plus its playback view
#[derive(Debug, Serialize)]
pub struct LessonView {
    pub lesson: Lesson,
    pub playback: PlaybackView,
}

#[derive(Debug, Serialize)]
pub struct LessonsResponse {
    /// True until the startup fetch resolves
    pub loading: bool,
    /// Fetch failure message, if the fetch failed
    pub error: Option<String>,
    /// Lessons in ascending `number` order
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_seconds: f64,
}

// ============================================================================
// Health & Build Info
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "rdl-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: ctx.backend.to_string(),
    })
}

/// GET /api/buildinfo
pub async fn get_build_info() -> Json<BuildInfo> {
    Json(BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Lessons
// ============================================================================

/// GET /api/lessons
pub async fn list_lessons(State(ctx): State<AppContext>) -> Json<LessonsResponse> {
    let lessons = ctx.state.lessons().await;
    let status = ctx.state.load_status().await;

    let views = ctx.manager.lock().await.views(&lessons);
    let lessons = lessons
        .into_iter()
        .zip(views)
        .map(|(lesson, playback)| LessonView { lesson, playback })
        .collect();

    let (loading, error) = match status {
        LoadStatus::Loading => (true, None),
        LoadStatus::Loaded => (false, None),
        LoadStatus::Failed { message } => (false, Some(message)),
    };

    Json(LessonsResponse {
        loading,
        error,
        lessons,
    })
}

/// GET /api/lessons/:id
pub async fn get_lesson(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<LessonView>> {
    let lesson = find_lesson(&ctx, id).await?;
    let playback = ctx
        .manager
        .lock()
        .await
        .view(id)
        .unwrap_or_else(|| PlaybackView::idle(id));

    Ok(Json(LessonView { lesson, playback }))
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /api/lessons/:id/toggle
///
/// Plays the lesson, or pauses it if it is the one playing. Any other
/// playing lesson is paused first.
pub async fn toggle(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<PlaybackView>> {
    find_lesson(&ctx, id).await?;
    let view = with_manager(&ctx, move |manager| manager.toggle_play(id)).await?;
    debug!(lesson_id = id, playing = view.playing, "Toggled playback");
    Ok(Json(view))
}

/// POST /api/lessons/:id/seek
///
/// Clamps the requested position to [0, duration] (only to >= 0 while the
/// duration is unknown).
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(request): Json<SeekRequest>,
) -> Result<Json<PlaybackView>> {
    if !request.position_seconds.is_finite() {
        return Err(Error::BadRequest(format!(
            "position_seconds must be finite, got {}",
            request.position_seconds
        )));
    }
    find_lesson(&ctx, id).await?;

    let view = with_manager(&ctx, move |manager| {
        let duration = manager.duration(id).unwrap_or(0.0);
        manager.seek(id, clamp_position(request.position_seconds, duration))
    })
    .await?;
    Ok(Json(view))
}

/// GET /api/lessons/:id/download
pub async fn download(State(ctx): State<AppContext>, Path(id): Path<i64>) -> Result<Redirect> {
    let lesson = find_lesson(&ctx, id).await?;
    Ok(Redirect::temporary(&lesson.audio_url))
}

// ============================================================================
// Helpers
// ============================================================================

async fn find_lesson(ctx: &AppContext, id: i64) -> Result<Lesson> {
    ctx.state.lesson(id).await.ok_or(Error::LessonNotFound(id))
}

/// Run a manager operation on the blocking pool.
///
/// Pausing or seeking a device handle joins its playback thread, which
/// waits for the output stream to close.
async fn with_manager<T, F>(ctx: &AppContext, op: F) -> Result<T>
where
    F: FnOnce(&mut PlaybackManager) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut manager = Arc::clone(&ctx.manager).lock_owned().await;
    tokio::task::spawn_blocking(move || op(&mut *manager))
        .await
        .map_err(|e| Error::Playback(format!("Playback task failed: {}", e)))?
}

fn clamp_position(position_seconds: f64, duration_seconds: f64) -> f64 {
    let position = position_seconds.max(0.0);
    if duration_seconds > 0.0 {
        position.min(duration_seconds)
    } else {
        position
    }
}
