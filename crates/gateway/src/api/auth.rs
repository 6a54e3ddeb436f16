//! Dashboard bearer-token auth.
//!
//! Tokens are validated against the OIDC userinfo endpoint; successful
//! validations are cached for seven days keyed by the SHA-256 of the
//! token, so the dashboard does not hammer the identity provider.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};

use nd_store::SettingsStore;

use crate::state::AppState;

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "detail": detail })),
    )
        .into_response()
}

pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Local development runs without an identity provider.
    if state.config.dev_mode {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if token.is_empty() {
        return unauthorized("Missing or invalid Authorization header");
    }

    let token_hash = SettingsStore::token_hash(token);
    match state.settings.is_token_cached(&token_hash).await {
        Ok(true) => return next.run(request).await,
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "token cache lookup failed"),
    }

    let userinfo_url = format!(
        "{}/api/oidc/userinfo",
        state.config.oidc_issuer.trim_end_matches('/')
    );
    let validation = state
        .http
        .get(&userinfo_url)
        .bearer_auth(token)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await;

    match validation {
        Ok(response) if response.status().is_success() => {
            if let Err(e) = state.settings.cache_token(&token_hash).await {
                tracing::warn!(error = %e, "token cache write failed");
            }
            next.run(request).await
        }
        Ok(_) => unauthorized("Invalid access token"),
        Err(e) => {
            tracing::error!(error = %e, "userinfo request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "detail": "Auth provider unreachable" })),
            )
                .into_response()
        }
    }
}
