//! SMS location-sharing loop.
//!
//! `GET /location/{link_id}` serves a page that asks the browser for
//! coordinates and posts them to `POST /receive-location/{link_id}`. A
//! link is consumed by its first successful POST; the handler then fires
//! the outbound callback that quotes a price and starts the transfer
//! sequence.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use serde::Deserialize;

use nd_domain::location::coordinates_valid;
use nd_domain::Location;

use crate::state::AppState;
use crate::transfer::{populate_queue, queue_for_provider};
use crate::twiml::{Gather, VoiceResponse};

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
}

fn api_error(status: StatusCode, detail: &str) -> Response {
    (status, Json(serde_json::json!({ "detail": detail }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /location/{link_id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn location_page(
    State(state): State<AppState>,
    Path(link_id): Path<i64>,
) -> Response {
    let link = match state.links.get(link_id).await {
        Ok(link) => link,
        Err(e) => {
            tracing::error!(link_id, error = %e, "link lookup failed");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error processing location link");
        }
    };
    let Some(link) = link else {
        return api_error(StatusCode::NOT_FOUND, "Link not found or expired");
    };
    if link.used {
        return api_error(StatusCode::GONE, "Link has already been used");
    }

    Html(render_page(link_id, &state.config.server_url)).into_response()
}

fn render_page(link_id: i64, server_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Standort teilen - Notdienststation</title>
<style>
  body {{ font-family: sans-serif; max-width: 28rem; margin: 3rem auto; padding: 0 1rem; text-align: center; }}
  button {{ font-size: 1.1rem; padding: 0.8rem 1.6rem; border-radius: 0.5rem; border: none; background: #1a7f37; color: #fff; }}
  #status {{ margin-top: 1.5rem; }}
</style>
</head>
<body>
<h1>Notdienststation</h1>
<p>Bitte teile uns deinen Standort mit, damit wir dir helfen können. Wir rufen dich anschließend zurück.</p>
<button onclick="shareLocation()">Standort teilen</button>
<p id="status"></p>
<script>
function shareLocation() {{
  const status = document.getElementById('status');
  if (!navigator.geolocation) {{
    status.textContent = 'Standortermittlung wird nicht unterstützt.';
    return;
  }}
  status.textContent = 'Standort wird ermittelt…';
  navigator.geolocation.getCurrentPosition(async (position) => {{
    const response = await fetch('{server_url}/receive-location/{link_id}', {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json' }},
      body: JSON.stringify({{
        latitude: position.coords.latitude,
        longitude: position.coords.longitude
      }})
    }});
    status.textContent = response.ok
      ? 'Vielen Dank! Wir rufen dich gleich zurück.'
      : 'Der Link ist nicht mehr gültig.';
  }}, () => {{
    status.textContent = 'Standort konnte nicht ermittelt werden.';
  }});
}}
</script>
</body>
</html>"#
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /receive-location/{link_id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn receive_location(
    State(state): State<AppState>,
    Path(link_id): Path<i64>,
    Json(payload): Json<LocationPayload>,
) -> Response {
    if !coordinates_valid(payload.latitude, payload.longitude) {
        return api_error(StatusCode::BAD_REQUEST, "Invalid coordinates");
    }

    let link = match state.links.get(link_id).await {
        Ok(Some(link)) => link,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "Link not found or expired"),
        Err(e) => {
            tracing::error!(link_id, error = %e, "link lookup failed");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error processing location data");
        }
    };
    if link.used {
        return api_error(StatusCode::GONE, "Link has already been used");
    }

    let phone = link.phone_number.clone();
    let location = Location::from_coordinates(payload.latitude, payload.longitude);

    let stored = async {
        state.calls.save_shared_location(&phone, &location).await?;
        state.links.mark_used(link_id, link).await
    }
    .await;
    if let Err(e) = stored {
        tracing::error!(link_id, error = %e, "shared location store failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error processing location data");
    }

    tracing::info!(link_id, %phone, "shared location received");

    // Quote and call back outside the request.
    let state_for_callback = state.clone();
    tokio::spawn(async move {
        if let Err(e) = outbound_after_location(&state_for_callback, &phone).await {
            tracing::error!(%phone, error = %e, "outbound callback failed");
        }
    });

    Json(serde_json::json!({
        "success": true,
        "message": "Location received successfully",
        "link_id": link_id,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound callback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Towing is the service the SMS loop exists for; fall back to it when
/// the original call's transient state has already expired.
fn towing_service(config: &nd_domain::config::Config) -> String {
    config
        .services
        .iter()
        .find(|s| s.contains("abschlepp"))
        .cloned()
        .unwrap_or_else(|| config.services[0].clone())
}

/// Price the shared position, queue the provider's contacts, and call the
/// customer back with the offer.
async fn outbound_after_location(state: &AppState, phone: &str) -> nd_domain::Result<()> {
    let service = match state.calls.get_service(phone).await? {
        Some(service) => service,
        None => towing_service(&state.config),
    };
    let Some(location) = state.calls.get_shared_location(phone).await? else {
        return Err(nd_domain::Error::Other(format!(
            "no shared location stored for {phone}"
        )));
    };

    let locations = state.settings.locations(&service).await?;
    let pricing = state.settings.pricing(&service).await?;
    let active_hours = state.settings.active_hours(&service).await?;

    let quote = nd_geo::get_price(
        &state.routes,
        location.longitude,
        location.latitude,
        &locations,
        &pricing,
        &active_hours,
    )
    .await?;

    state
        .calls
        .save_job_info(phone, "Preis", &format!("{}€", quote.price))
        .await?;
    state
        .calls
        .save_job_info(phone, "Ankunftszeit", &format!("{} Minuten", quote.eta_minutes))
        .await?;
    state
        .calls
        .save_job_info(phone, "Dienstleister", &quote.provider_name)
        .await?;

    let emergency = state.settings.emergency_contact(&service).await?;
    let entries = queue_for_provider(&locations, &emergency, &quote.provider_name);
    populate_queue(&state.calls, phone, &entries).await?;

    let announcements = state.settings.announcements(&service).await?;
    let offer = announcements
        .price_offer
        .replace("{price}", &quote.price.to_string())
        .replace("{minutes}", &quote.eta_minutes.to_string());
    let message =
        format!("Hier ist die Notdienststation. Wir haben deinen Standort erhalten. {offer}");

    let mut twiml = VoiceResponse::new(&state.config.voice);
    twiml.gather(Gather::speech("/parse-connection-request", 15).prompt(message));
    twiml.gather(
        Gather::speech("/parse-connection-request", 15)
            .prompt(announcements.price_offer_prompt.clone()),
    );

    state.twilio.create_call(phone, &twiml.to_xml()).await?;
    state.calls.agent_message(phone, &offer).await?;
    Ok(())
}
