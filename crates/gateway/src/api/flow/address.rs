//! Address collection: `/ask-adress`, `/process-address`,
//! `/address-processed`, `/confirm-address`.
//!
//! The address turn is recorded rather than gathered: transcription runs
//! against the full recording in a detached task while the caller hears
//! the processing prompt, and `/address-processed` polls the store for the
//! result.

use std::time::Duration;

use axum::extract::{Form, State};
use axum::response::Response;

use nd_domain::{CallContext, Result};

use crate::state::AppState;
use crate::twiml::Gather;
use crate::twilio::recording_media_url;

use super::{
    bounded_llm, call_context, error_fallback, llm_timeout_fallback, narrate, new_response,
    spell_digits, xml_response, CallForm,
};

/// How long `/address-processed` waits for the background transcription.
const TRANSCRIPTION_WAIT: Duration = Duration::from_millis(100);
const TRANSCRIPTION_POLLS: u32 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /ask-adress
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ask_address(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match ask_address_inner(&state, &ctx).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn ask_address_inner(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.address_request).await;
    response.record("/process-address", 4, 10);
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /process-address
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn process_address(
    State(state): State<AppState>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match process_address_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn process_address_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();

    let Some(recording_url) = form.recording_url.clone() else {
        tracing::warn!(caller, "no recording delivered, falling back to PLZ entry");
        let mut response = new_response(state);
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    };

    // Transcribe in the background; /address-processed polls for the text.
    {
        let speech = state.speech.clone();
        let calls = state.calls.clone();
        let caller = caller.to_string();
        let media_url = recording_media_url(&recording_url);
        tokio::spawn(async move {
            match speech.transcribe(&media_url).await {
                Ok(text) => {
                    if let Err(e) = calls.set_transcription_text(&caller, &text).await {
                        tracing::error!(caller, error = %e, "transcription store failed");
                    }
                }
                Err(e) => tracing::error!(caller, error = %e, "transcription failed"),
            }
        });
    }

    let announcements = state.settings.announcements(&ctx.service).await?;
    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.address_processing).await;
    response.redirect("/address-processed");
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /address-processed
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn address_processed(
    State(state): State<AppState>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match address_processed_inner(&state, &ctx).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn address_processed_inner(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();

    // Wait up to three seconds for the background transcription.
    let mut transcription = None;
    for _ in 0..TRANSCRIPTION_POLLS {
        transcription = state.calls.get_transcription_text(caller).await?;
        if transcription.is_some() {
            break;
        }
        tokio::time::sleep(TRANSCRIPTION_WAIT).await;
    }
    let Some(transcription) = transcription else {
        tracing::warn!(caller, "transcription timed out, falling back to PLZ entry");
        let mut response = new_response(state);
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    };

    state.calls.user_message(caller, &transcription).await?;

    let Some(answer) = bounded_llm(state.llm.process_location(&transcription)).await? else {
        return Ok(llm_timeout_fallback(state, ctx).await);
    };
    let extraction = answer.value;

    // Caller cannot state an address at all: offer the SMS link.
    if !extraction.knows_location {
        state
            .calls
            .ai_message(
                caller,
                "<Location not known by caller: knows_location=false>",
                Some(answer.duration),
                Some(&answer.source),
            )
            .await?;
        let mut response = new_response(state);
        response.redirect("/ask-send-sms");
        return Ok(xml_response(&response));
    }

    // Partial address: fall back to PLZ entry.
    if !extraction.contains_location || !extraction.contains_city {
        state
            .calls
            .ai_message(
                caller,
                &format!(
                    "<Location extraction failed: contains_location={}, contains_city={}>",
                    extraction.contains_location, extraction.contains_city
                ),
                Some(answer.duration),
                Some(&answer.source),
            )
            .await?;
        let mut response = new_response(state);
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    }

    let address = extraction.address.unwrap_or_default();
    state
        .calls
        .ai_message(
            caller,
            &format!("<Location extracted: {address}>"),
            Some(answer.duration),
            Some(&answer.source),
        )
        .await?;

    let location = match state.geocoder.geocode(&address).await {
        Ok(location) => location,
        Err(e) => {
            tracing::error!(caller, error = %e, "geocoding failed");
            None
        }
    };
    let Some(mut location) = location.filter(|l| l.plz.is_some() || l.ort.is_some()) else {
        state
            .calls
            .google_message(
                caller,
                &format!("Google Maps konnte die Adresse '{address}' nicht eindeutig finden."),
                None,
            )
            .await?;
        let mut response = new_response(state);
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    };

    state
        .calls
        .save_job_info(caller, "Adresse erkannt", &address)
        .await?;

    // Repair an incomplete postal code: reverse geocode slightly east,
    // then consult the LLM.
    let resolved_plz = match location.plz.clone().filter(|p| p.len() == 5) {
        Some(plz) => Some(plz),
        None => {
            let shifted = state
                .geocoder
                .plz_at(
                    location.latitude,
                    location.longitude + nd_geo::PLZ_REPAIR_LNG_SHIFT,
                )
                .await
                .unwrap_or(None);
            match shifted {
                Some(plz) => Some(plz),
                None => {
                    let hint = location.ort.clone().unwrap_or_else(|| address.clone());
                    state
                        .llm
                        .correct_plz(&hint, location.latitude, location.longitude)
                        .await
                }
            }
        }
    };
    if let Some(plz) = resolved_plz {
        location.plz = Some(plz);
    }

    state.calls.save_location(caller, &location).await?;
    state
        .calls
        .google_message(
            caller,
            &format!(
                "Google Maps Ergebnis: {} ({})",
                location.formatted_address.as_deref().unwrap_or(""),
                location.google_maps_link.as_deref().unwrap_or("")
            ),
            None,
        )
        .await?;

    // Confirmation prompt: postal code digit-by-digit plus the city.
    let plz_spoken = location
        .plz
        .as_deref()
        .map(spell_digits)
        .unwrap_or_default();
    let place_phrase = [plz_spoken.as_str(), location.ort.as_deref().unwrap_or("")]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let place_phrase = if place_phrase.is_empty() {
        location.formatted_address.clone().unwrap_or_default()
    } else {
        place_phrase
    };

    let announcements = state.settings.announcements(&ctx.service).await?;
    let confirm = announcements
        .address_confirm
        .replace("{place_phrase}", &place_phrase);

    let mut response = new_response(state);
    if let Err(e) = state.calls.agent_message(caller, &confirm).await {
        tracing::warn!(caller, error = %e, "transcript write failed");
    }
    response.gather(Gather::speech("/confirm-address", 15).prompt(confirm));
    response.gather(
        Gather::speech("/confirm-address", 15).prompt(announcements.address_confirm_prompt.clone()),
    );
    response.redirect("/ask-adress");
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /confirm-address
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn confirm_address(
    State(state): State<AppState>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match confirm_address_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn confirm_address_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let speech = form.speech();
    state.calls.user_message(caller, speech).await?;

    let Some(answer) = bounded_llm(state.llm.yes_no_question(
        speech,
        "Der Kunde wurde gefragt ob die Adresse korrekt ist.",
    ))
    .await?
    else {
        return Ok(llm_timeout_fallback(state, ctx).await);
    };

    state
        .calls
        .ai_message(
            caller,
            &format!("Address confirmation: {}", answer.value.reasoning),
            Some(answer.duration),
            Some(&answer.source),
        )
        .await?;

    let mut response = new_response(state);
    if answer.value.is_agreement {
        response.redirect("/start-pricing");
    } else {
        response.redirect("/ask-plz");
    }
    Ok(xml_response(&response))
}
