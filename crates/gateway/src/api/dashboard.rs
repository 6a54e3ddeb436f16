//! Dashboard API: provider locations, vacation mode, active hours.
//!
//! External to the call flow — these endpoints edit the per-service
//! settings the flow reads. All routes sit behind the bearer-token
//! middleware in [`super::router`].

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use nd_domain::settings::{ActiveHours, ProviderLocation, VacationMode};

use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn check_service(state: &AppState, service: &str) -> Option<Response> {
    if state.config.services.iter().any(|s| s == service) {
        None
    } else {
        Some(api_error(StatusCode::BAD_REQUEST, "Invalid service"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contacts (provider locations)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_contacts(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }
    match state.settings.locations(&service).await {
        Ok(locations) => Json(locations).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn create_contact(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(mut location): Json<ProviderLocation>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }
    location.id = Some(uuid::Uuid::new_v4().to_string());

    let result = async {
        let mut locations = state.settings.locations(&service).await?;
        locations.push(location.clone());
        state.settings.set_locations(&service, &locations).await
    }
    .await;

    match result {
        Ok(()) => (StatusCode::CREATED, Json(location)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn update_contact(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
    Json(update): Json<ProviderLocation>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }

    let result: nd_domain::Result<Option<ProviderLocation>> = async {
        let mut locations = state.settings.locations(&service).await?;
        let Some(existing) = locations
            .iter_mut()
            .find(|l| l.id.as_deref() == Some(id.as_str()))
        else {
            return Ok(None);
        };
        *existing = ProviderLocation {
            id: Some(id.clone()),
            ..update.clone()
        };
        let updated = existing.clone();
        state.settings.set_locations(&service, &locations).await?;
        Ok(Some(updated))
    }
    .await;

    match result {
        Ok(Some(updated)) => Json(updated).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "Contact not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }

    let result: nd_domain::Result<bool> = async {
        let mut locations = state.settings.locations(&service).await?;
        let before = locations.len();
        locations.retain(|l| l.id.as_deref() != Some(id.as_str()));
        if locations.len() == before {
            return Ok(false);
        }
        state.settings.set_locations(&service, &locations).await?;
        Ok(true)
    }
    .await;

    match result {
        Ok(true) => Json(serde_json::json!({ "status": "deleted" })).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "Contact not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<String>,
}

/// Reorder locations to match the given id list; unknown ids are ignored,
/// unlisted locations keep their relative order at the end.
pub async fn reorder_contacts(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(body): Json<ReorderRequest>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }

    let result: nd_domain::Result<Vec<ProviderLocation>> = async {
        let locations = state.settings.locations(&service).await?;
        let mut reordered: Vec<ProviderLocation> = Vec::with_capacity(locations.len());
        for id in &body.ids {
            if let Some(location) = locations
                .iter()
                .find(|l| l.id.as_deref() == Some(id.as_str()))
            {
                reordered.push(location.clone());
            }
        }
        for location in &locations {
            if !reordered.iter().any(|l| l.id == location.id) {
                reordered.push(location.clone());
            }
        }
        state.settings.set_locations(&service, &reordered).await?;
        Ok(reordered)
    }
    .await;

    match result {
        Ok(reordered) => Json(reordered).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_vacation(State(state): State<AppState>) -> Response {
    match state.settings.vacation_mode().await {
        Ok(vacation) => Json(vacation).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn set_vacation(
    State(state): State<AppState>,
    Json(vacation): Json<VacationMode>,
) -> Response {
    match state.settings.set_vacation_mode(&vacation).await {
        Ok(()) => Json(vacation).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_active_hours(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }
    match state.settings.active_hours(&service).await {
        Ok(hours) => Json(hours).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn set_active_hours(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(hours): Json<ActiveHours>,
) -> Response {
    if let Some(rejection) = check_service(&state, &service) {
        return rejection;
    }
    match state.settings.set_active_hours(&service, &hours).await {
        Ok(()) => Json(hours).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn dashboard_status(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "services": state.config.services,
    }))
    .into_response()
}
