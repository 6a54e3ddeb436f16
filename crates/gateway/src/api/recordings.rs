//! Recording ingest and range-aware playback.
//!
//! The telephony provider signals completion on
//! `/recording-status-callback/{caller}`; the media is downloaded with the
//! read-only account and stored next to the call. Playback endpoints honor
//! HTTP byte ranges so dashboard audio players can seek.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use nd_store::keys::decode_phone;
use nd_store::{RecordingMetadata, RecordingType};

use crate::state::AppState;
use crate::twilio::recording_media_url;

use super::flow::CallForm;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ingest: /recording-status-callback/{caller}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn recording_status_callback(
    State(state): State<AppState>,
    Path(encoded_caller): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Form(form): Form<CallForm>,
) -> Response {
    let caller = decode_phone(&encoded_caller);
    let recording_type = RecordingType::parse(params.get("source").map(|s| s.as_str()));

    if form.recording_status.as_deref() == Some("completed") {
        if let Some(recording_url) = form.recording_url.clone() {
            if let Err(e) = ingest(&state, &caller, &recording_url, recording_type, &form).await {
                tracing::error!(%caller, error = %e, "recording ingest failed");
            }
        }
    }

    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn ingest(
    state: &AppState,
    caller: &str,
    recording_url: &str,
    recording_type: RecordingType,
    form: &CallForm,
) -> nd_domain::Result<()> {
    let Some(timestamp) = state.calls.get_call_timestamp(caller).await? else {
        tracing::warn!(caller, "no call timestamp, dropping recording");
        return Ok(());
    };

    let media_url = recording_media_url(recording_url);
    let segment_duration = form
        .recording_duration
        .as_deref()
        .and_then(|d| d.parse::<u32>().ok());

    tracing::info!(
        caller,
        recording_sid = ?form.recording_sid,
        recording_type = recording_type.as_str(),
        "downloading recording"
    );
    let (bytes, content_type) = state.twilio.download_recording(&media_url).await?;

    let metadata = RecordingMetadata {
        recording_sid: form.recording_sid.clone(),
        recording_type: recording_type.as_str().to_string(),
        bytes_total: bytes.len(),
        segment_duration_seconds: segment_duration,
        call_timestamp: Some(timestamp.clone()),
    };

    state
        .recordings
        .save(caller, &timestamp, recording_type, bytes, &content_type, &metadata)
        .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Playback: /recordings/{number}/{timestamp} (+ /recordings/link/…)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn fetch_initial_recording(
    State(state): State<AppState>,
    Path((number, timestamp)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    serve(&state, &number, &timestamp, RecordingType::Initial, &headers).await
}

pub async fn fetch_followup_recording(
    State(state): State<AppState>,
    Path((number, timestamp)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    serve(&state, &number, &timestamp, RecordingType::Followup, &headers).await
}

async fn serve(
    state: &AppState,
    number: &str,
    timestamp: &str,
    recording_type: RecordingType,
    headers: &HeaderMap,
) -> Response {
    let stored = match state.recordings.get(number, timestamp, recording_type).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(number, timestamp, error = %e, "recording lookup failed");
            None
        }
    };
    let Some((bytes, content_type)) = stored else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Recording not found" })),
        )
            .into_response();
    };

    let total = bytes.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| parse_range(raw, total));

    let builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            "Content-Range, Accept-Ranges, Content-Length",
        );

    let result = match range {
        Some((start, end)) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{total}"),
            )
            .body(Body::from(bytes[start..=end].to_vec())),
        None => builder.status(StatusCode::OK).body(Body::from(bytes)),
    };

    result.unwrap_or_else(|e| {
        tracing::error!(error = %e, "recording response build failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// Parse `Range: bytes=a-b` (or the open-ended `bytes=a-`) against a body
/// of `total` bytes. The start is clamped into `[0, total-1]`, the end
/// into `[start, total-1]`. Suffix ranges and anything unparseable fall
/// back to a full-body response.
fn parse_range(raw: &str, total: usize) -> Option<(usize, usize)> {
    if total == 0 {
        return None;
    }
    let spec = raw.trim().strip_prefix("bytes=")?;
    let (start_raw, end_raw) = spec.split_once('-')?;

    let start: usize = start_raw.trim().parse().ok()?;
    let start = start.min(total - 1);
    let end = end_raw
        .trim()
        .parse::<usize>()
        .ok()
        .unwrap_or(total - 1)
        .min(total - 1)
        .max(start);

    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_range() {
        assert_eq!(parse_range("bytes=10-19", 100), Some((10, 19)));
    }

    #[test]
    fn end_is_clamped_to_body() {
        assert_eq!(parse_range("bytes=50-500", 100), Some((50, 99)));
    }

    #[test]
    fn open_ended_range() {
        assert_eq!(parse_range("bytes=30-", 100), Some((30, 99)));
    }

    #[test]
    fn start_beyond_body_is_clamped() {
        assert_eq!(parse_range("bytes=500-600", 100), Some((99, 99)));
    }

    #[test]
    fn start_after_end_normalizes() {
        assert_eq!(parse_range("bytes=80-20", 100), Some((80, 80)));
    }

    #[test]
    fn first_byte_only() {
        assert_eq!(parse_range("bytes=0-0", 100), Some((0, 0)));
    }

    #[test]
    fn suffix_and_garbage_fall_back_to_full_body() {
        assert_eq!(parse_range("bytes=-50", 100), None);
        assert_eq!(parse_range("bytes=abc-def", 100), None);
        assert_eq!(parse_range("items=0-10", 100), None);
        assert_eq!(parse_range("bytes=0-10", 0), None);
    }

    #[test]
    fn range_length_matches_content_range_contract() {
        // bytes=10-19 of 100: ten bytes, "bytes 10-19/100".
        let (start, end) = parse_range("bytes=10-19", 100).unwrap();
        assert_eq!(end - start + 1, 10);
        // bytes=50-500 of 100: fifty bytes, "bytes 50-99/100".
        let (start, end) = parse_range("bytes=50-500", 100).unwrap();
        assert_eq!(end - start + 1, 50);
    }
}
