//! Serves cached TTS snippets: `GET /audio/{key}.mp3`.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::state::AppState;

pub async fn get_audio(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let Some(key) = file.strip_suffix(".mp3") else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Audio not found" })),
        )
            .into_response();
    };

    match state.audio_cache.get("audio", key) {
        Some(bytes) => (
            [
                (header::CONTENT_TYPE, "audio/mpeg"),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            bytes,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Audio not found" })),
        )
            .into_response(),
    }
}
