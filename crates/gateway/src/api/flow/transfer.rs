//! Transfer status callbacks: `/parse-transfer-call/{name}/{phone}` and
//! the call-lifecycle webhook `/status`.

use axum::extract::{Form, Path, State};
use axum::response::{IntoResponse, Json, Response};

use nd_domain::{CallContext, Result};

use crate::state::AppState;
use crate::transfer::{start_transfer, TransferStart};

use super::{call_context, error_fallback, narrate, new_response, xml_response, CallForm};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /parse-transfer-call/{name}/{phone}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn parse_transfer_call(
    State(state): State<AppState>,
    Path((name, phone)): Path<(String, String)>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match parse_transfer_call_inner(&state, &ctx, &form, &name, &phone).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn parse_transfer_call_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
    contact_name: &str,
    contact_phone: &str,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let dial_status = form.dial_call_status.as_deref().unwrap_or("");
    tracing::info!(caller, contact_name, contact_phone, dial_status, "transfer attempt finished");

    let mut response = new_response(state);

    if matches!(dial_status, "completed" | "answered") {
        state
            .calls
            .save_job_info(caller, "Erfolgreich weitergeleitet", "Ja")
            .await?;
        state
            .calls
            .save_job_info(caller, "Weitergeleitet an", contact_name)
            .await?;
        state
            .calls
            .twilio_message(
                caller,
                &format!("Erfolgreich weitergeleitet an {contact_name} ({contact_phone})"),
            )
            .await?;
        state
            .calls
            .set_transferred_to(caller, contact_phone, contact_name)
            .await?;
        state
            .calls
            .save_job_info(caller, "hangup_reason", "Erfolgreich weitergeleitet")
            .await?;

        // Job summary for the contact who answered; best-effort.
        send_job_details_sms(state, ctx, contact_phone.to_string()).await;

        response.hangup();
        return Ok(xml_response(&response));
    }

    // Failed attempt: pop the head and dial the next contact.
    state
        .calls
        .twilio_message(
            caller,
            &format!("Weiterleitung an {contact_name} fehlgeschlagen mit Status {dial_status}"),
        )
        .await?;
    state
        .calls
        .save_job_info(caller, "Erfolgreich weitergeleitet", "Nein")
        .await?;
    state.calls.delete_next_caller(caller).await?;

    match start_transfer(state, &mut response, caller, &ctx.service).await? {
        TransferStart::Dialing => {}
        TransferStart::NoMoreAgents => {
            let announcements = state.settings.announcements(&ctx.service).await?;
            narrate(state, &mut response, caller, &announcements.no_agents_available).await;
            state
                .calls
                .save_job_info(caller, "hangup_reason", "Keine Mitarbeiter erreichbar")
                .await?;
            response.hangup();
        }
    }
    Ok(xml_response(&response))
}

/// Text the accepting contact a summary of the job. Runs detached; a lost
/// SMS never blocks the hangup.
async fn send_job_details_sms(state: &AppState, ctx: &CallContext, contact_phone: String) {
    let state = state.clone();
    let caller = ctx.caller.key().to_string();
    tokio::spawn(async move {
        let mut lines = vec![format!("Neuer Auftrag von {caller}.")];
        for field in ["Adresse erkannt", "PLZ eingegeben", "Preis", "Ankunftszeit"] {
            if let Ok(Some(value)) = state.calls.get_job_info(&caller, field).await {
                lines.push(format!("{field}: {value}"));
            }
        }
        if let Ok(Some(location)) = state.calls.get_location(&caller).await {
            if let Some(link) = location.google_maps_link {
                lines.push(format!("Karte: {link}"));
            }
        }
        if let Err(e) = state.twilio.send_sms(&contact_phone, &lines.join("\n")).await {
            tracing::warn!(contact_phone, error = %e, "job details sms failed");
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn status(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    let caller = ctx.caller.key();
    tracing::info!(caller, call_status = ?form.call_status, "call status webhook");

    if form.call_status.as_deref() == Some("completed") {
        let _ = state.calls.save_job_info(caller, "Live", "Nein").await;
        match state.calls.get_job_info(caller, "hangup_reason").await {
            Ok(None) => {
                let _ = state
                    .calls
                    .save_job_info(caller, "hangup_reason", "Anruf durch Kunde beendet")
                    .await;
            }
            Ok(Some(_)) => {}
            Err(e) => tracing::warn!(caller, error = %e, "hangup reason lookup failed"),
        }
    }

    Json(serde_json::json!({ "status": "ok" })).into_response()
}
