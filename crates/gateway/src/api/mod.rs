//! HTTP surface.
//!
//! Routes are split into the **telephony** set (webhooks and public
//! resources the provider and the shared-location page hit — no auth; the
//! provider cannot do bearer tokens) and the **dashboard** set behind the
//! OIDC bearer-token middleware.

pub mod audio;
pub mod auth;
pub mod dashboard;
pub mod flow;
pub mod location_share;
pub mod recordings;

use axum::http::Method;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the full router.
pub fn router(state: AppState) -> Router<AppState> {
    let telephony = Router::new()
        // Call entry + intent
        .route("/incoming-call", get(flow::entry::incoming_call).post(flow::entry::incoming_call))
        .route("/parse-intent-1", get(flow::entry::parse_intent_1).post(flow::entry::parse_intent_1))
        .route("/parse-intent-2", get(flow::entry::parse_intent_2).post(flow::entry::parse_intent_2))
        // Address collection
        .route("/ask-adress", get(flow::address::ask_address).post(flow::address::ask_address))
        .route("/process-address", get(flow::address::process_address).post(flow::address::process_address))
        .route("/address-processed", get(flow::address::address_processed).post(flow::address::address_processed))
        .route("/confirm-address", get(flow::address::confirm_address).post(flow::address::confirm_address))
        // PLZ fallback + SMS offer
        .route("/ask-plz", get(flow::plz::ask_plz).post(flow::plz::ask_plz))
        .route("/process-plz", get(flow::plz::process_plz).post(flow::plz::process_plz))
        .route("/ask-send-sms", get(flow::plz::ask_send_sms).post(flow::plz::ask_send_sms))
        .route("/process-sms-offer", get(flow::plz::process_sms_offer).post(flow::plz::process_sms_offer))
        // Pricing + transfer
        .route("/start-pricing", get(flow::pricing::start_pricing).post(flow::pricing::start_pricing))
        .route(
            "/parse-connection-request",
            get(flow::pricing::parse_connection_request).post(flow::pricing::parse_connection_request),
        )
        .route(
            "/parse-transfer-call/:name/:phone",
            get(flow::transfer::parse_transfer_call).post(flow::transfer::parse_transfer_call),
        )
        .route("/status", get(flow::transfer::status).post(flow::transfer::status))
        // Recordings
        .route(
            "/recording-status-callback/:caller",
            get(recordings::recording_status_callback).post(recordings::recording_status_callback),
        )
        .route("/recordings/:number/:timestamp", get(recordings::fetch_initial_recording))
        .route("/recordings/link/:number/:timestamp", get(recordings::fetch_followup_recording))
        // Location sharing
        .route("/location/:link_id", get(location_share::location_page))
        .route("/receive-location/:link_id", post(location_share::receive_location))
        // Cached TTS audio
        .route("/audio/:file", get(audio::get_audio))
        // Health probe
        .route("/health", get(health));

    let protected = Router::new()
        .route("/api/dashboard/contacts/:service", get(dashboard::list_contacts))
        .route("/api/dashboard/contacts/:service", post(dashboard::create_contact))
        .route("/api/dashboard/contacts/:service/reorder", put(dashboard::reorder_contacts))
        .route("/api/dashboard/contacts/:service/:id", put(dashboard::update_contact))
        .route("/api/dashboard/contacts/:service/:id", delete(dashboard::delete_contact))
        .route("/api/dashboard/settings/vacation", get(dashboard::get_vacation))
        .route("/api/dashboard/settings/vacation", put(dashboard::set_vacation))
        .route(
            "/api/dashboard/settings/:service/active-hours",
            get(dashboard::get_active_hours),
        )
        .route(
            "/api/dashboard/settings/:service/active-hours",
            put(dashboard::set_active_hours),
        )
        .route("/api/dashboard/status", get(dashboard::dashboard_status))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth));

    telephony.merge(protected).layer(cors_layer())
}

/// Dashboard and the shared-location page load from other origins.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Simple health probe for monitoring and load balancers.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "notdienst-agent",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
