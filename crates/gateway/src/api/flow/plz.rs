//! PLZ fallback and the SMS offer: `/ask-plz`, `/process-plz`,
//! `/ask-send-sms`, `/process-sms-offer`.

use axum::extract::{Form, State};
use axum::response::Response;

use nd_domain::{CallContext, Result};
use nd_geo::in_service_area;

use crate::state::AppState;
use crate::twiml::Gather;

use super::{
    bounded_llm, call_context, error_fallback, llm_timeout_fallback, narrate, new_response,
    transfer_with_message, xml_response, CallForm,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /ask-plz
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ask_plz(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match ask_plz_inner(&state, &ctx).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn ask_plz_inner(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let mut response = new_response(state);
    if let Err(e) = state
        .calls
        .agent_message(caller, &announcements.zipcode_request)
        .await
    {
        tracing::warn!(caller, error = %e, "transcript write failed");
    }
    response.gather(
        Gather::dtmf_and_speech("/process-plz", 10, 5).prompt(announcements.zipcode_request),
    );
    response.redirect("/ask-plz");
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /process-plz
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Digits of a spoken PLZ: "7 9 5 9 3." becomes "79593".
fn digits_of(speech: &str) -> String {
    speech.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub async fn process_plz(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match process_plz_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn process_plz_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let plz = match (form.digits.as_deref(), form.speech_result.as_deref()) {
        (Some(digits), _) if !digits.is_empty() => {
            state
                .calls
                .user_message(caller, &format!("DTMF PLZ: {digits}"))
                .await?;
            digits.to_string()
        }
        (_, Some(speech)) if !speech.is_empty() => {
            let cleaned = digits_of(speech);
            state
                .calls
                .user_message(caller, &format!("Speech PLZ: {speech} (cleaned: {cleaned})"))
                .await?;
            cleaned
        }
        _ => {
            tracing::warn!(caller, "no PLZ input received");
            let mut response = new_response(state);
            response.redirect("/ask-send-sms");
            return Ok(xml_response(&response));
        }
    };

    // Must be exactly five digits before we spend a geocode on it.
    if plz.len() != 5 || !plz.chars().all(|c| c.is_ascii_digit()) {
        let mut response = new_response(state);
        narrate(state, &mut response, caller, &announcements.plz_invalid_format).await;
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    }

    let location = match state.geocoder.geocode(&plz).await {
        Ok(location) => location,
        Err(e) => {
            tracing::error!(caller, %plz, error = %e, "PLZ geocoding failed");
            None
        }
    };
    let Some(location) = location.filter(|l| l.plz.is_some() || l.ort.is_some()) else {
        state
            .calls
            .google_message(caller, &format!("Keine Standortdaten für PLZ {plz} gefunden."), None)
            .await?;
        let mut response = new_response(state);
        narrate(state, &mut response, caller, &announcements.plz_not_found).await;
        response.redirect("/ask-send-sms");
        return Ok(xml_response(&response));
    };

    // Out-of-area PLZ goes to the SMS loop rather than a bogus quote.
    let formatted = location.formatted_address.clone().unwrap_or_default();
    if !in_service_area(&formatted) {
        state
            .calls
            .google_message(
                caller,
                &format!("PLZ {plz} liegt außerhalb des Servicegebiets: {formatted}"),
                None,
            )
            .await?;
        let mut response = new_response(state);
        narrate(state, &mut response, caller, &announcements.plz_outside_area).await;
        response.redirect("/ask-send-sms");
        return Ok(xml_response(&response));
    }

    state.calls.save_location(caller, &location).await?;
    state.calls.save_job_info(caller, "PLZ eingegeben", &plz).await?;
    state
        .calls
        .google_message(caller, &format!("PLZ geocoded: {formatted}"), None)
        .await?;

    let mut response = new_response(state);
    response.redirect("/start-pricing");
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /ask-send-sms
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ask_send_sms(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match ask_send_sms_inner(&state, &ctx).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn ask_send_sms_inner(state: &AppState, ctx: &CallContext) -> Result<Response> {
    // No number to text: hand over to a human instead.
    if ctx.caller.is_anonymous() {
        return Ok(transfer_with_message(state, ctx, None).await);
    }

    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let mut response = new_response(state);
    if let Err(e) = state
        .calls
        .agent_message(caller, &announcements.sms_offer)
        .await
    {
        tracing::warn!(caller, error = %e, "transcript write failed");
    }
    response.gather(Gather::speech("/process-sms-offer", 5).prompt(announcements.sms_offer));
    // Silence counts as "no": hand over to a human.
    narrate(state, &mut response, caller, &announcements.transfer_message).await;
    if let Err(e) = crate::transfer::ensure_queue(state, caller, &ctx.service).await {
        tracing::error!(caller, error = %e, "queue population failed");
    }
    if let Err(e) =
        crate::transfer::start_transfer(state, &mut response, caller, &ctx.service).await
    {
        tracing::error!(caller, error = %e, "silence fallback transfer failed");
    }
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /process-sms-offer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn process_sms_offer(
    State(state): State<AppState>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match process_sms_offer_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn process_sms_offer_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let speech = form.speech();
    state.calls.user_message(caller, speech).await?;

    let Some(answer) = bounded_llm(state.llm.yes_no_question(
        speech,
        "Der Kunde wurde gefragt ob er eine SMS mit dem Link erhalten möchte.",
    ))
    .await?
    else {
        return Ok(llm_timeout_fallback(state, ctx).await);
    };

    state
        .calls
        .ai_message(
            caller,
            &format!("SMS offer response: {}", answer.value.reasoning),
            Some(answer.duration),
            Some(&answer.source),
        )
        .await?;

    if !answer.value.is_agreement {
        state
            .calls
            .save_job_info(caller, "SMS versendet", "Nein - Kunde abgelehnt")
            .await?;
        return Ok(transfer_with_message(state, ctx, None).await);
    }

    send_location_sms(state, ctx).await
}

/// Generate the link, text it to the caller, and end the call; the
/// location POST triggers the outbound callback later.
async fn send_location_sms(state: &AppState, ctx: &CallContext) -> Result<Response> {
    if ctx.caller.is_anonymous() {
        return Ok(transfer_with_message(state, ctx, None).await);
    }

    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let link = state.links.generate(caller).await?;
    let link_url = format!("{}/location/{}", state.config.server_url, link.link_id);
    let body = format!(
        "Hallo, hier ist die Notdienststation. Bitte teile uns deinen Standort mit, \
         indem du auf den folgenden Link klickst: {link_url}"
    );
    state.twilio.send_sms(caller, &body).await?;

    state.calls.save_job_info(caller, "SMS versendet", "Ja").await?;
    state
        .calls
        .save_job_info(caller, "hangup_reason", "Warte auf Standort per SMS")
        .await?;

    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.sms_sent_confirmation).await;
    response.hangup();
    Ok(xml_response(&response))
}
