//! Quote and connection offer: `/start-pricing`,
//! `/parse-connection-request`.

use axum::extract::{Form, State};
use axum::response::Response;

use nd_domain::{CallContext, Result};

use crate::state::AppState;
use crate::transfer::{populate_queue, queue_for_provider, start_transfer, TransferStart};
use crate::twiml::Gather;

use super::{
    bounded_llm, call_context, error_fallback, llm_timeout_fallback, narrate, new_response,
    transfer_with_message, xml_response, CallForm,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /start-pricing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn start_pricing(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match start_pricing_inner(&state, &ctx).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn start_pricing_inner(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();

    let Some(location) = state.calls.get_location(caller).await? else {
        tracing::error!(caller, "pricing requested without a stored location");
        let mut response = new_response(state);
        narrate(
            state,
            &mut response,
            caller,
            "Es ist ein Fehler aufgetreten. Bitte versuche es erneut.",
        )
        .await;
        response.redirect("/ask-plz");
        return Ok(xml_response(&response));
    };

    let locations = state.settings.locations(&ctx.service).await?;
    let pricing = state.settings.pricing(&ctx.service).await?;
    let active_hours = state.settings.active_hours(&ctx.service).await?;

    let quote = match nd_geo::get_price(
        &state.routes,
        location.longitude,
        location.latitude,
        &locations,
        &pricing,
        &active_hours,
    )
    .await
    {
        Ok(quote) => quote,
        Err(e) => {
            state
                .calls
                .ai_message(caller, &format!("<Pricing failed: {e}>"), None, None)
                .await?;
            return Ok(transfer_with_message(state, ctx, None).await);
        }
    };

    state
        .calls
        .save_job_info(caller, "Preis", &format!("{}€", quote.price))
        .await?;
    state
        .calls
        .save_job_info(caller, "Ankunftszeit", &format!("{} Minuten", quote.eta_minutes))
        .await?;
    state
        .calls
        .save_job_info(caller, "Dienstleister", &quote.provider_name)
        .await?;
    state
        .calls
        .save_job_info(caller, "Dienstleister Telefon", &quote.provider_phone)
        .await?;

    // The queue is fixed here; the transfer loop only consumes it.
    let emergency = state.settings.emergency_contact(&ctx.service).await?;
    let entries = queue_for_provider(&locations, &emergency, &quote.provider_name);
    populate_queue(&state.calls, caller, &entries).await?;

    let announcements = state.settings.announcements(&ctx.service).await?;
    let offer = announcements
        .price_offer
        .replace("{price}", &quote.price.to_string())
        .replace("{minutes}", &quote.eta_minutes.to_string());

    let mut response = new_response(state);
    if let Err(e) = state.calls.agent_message(caller, &offer).await {
        tracing::warn!(caller, error = %e, "transcript write failed");
    }
    response.gather(
        Gather::speech("/parse-connection-request", 5)
            .prompt(offer)
            .prompt(announcements.price_offer_prompt.clone()),
    );
    response.redirect("/start-pricing");
    Ok(xml_response(&response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /parse-connection-request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn parse_connection_request(
    State(state): State<AppState>,
    Form(form): Form<CallForm>,
) -> Response {
    let ctx = call_context(&state, &form).await;
    match parse_connection_request_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn parse_connection_request_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let speech = form.speech();
    state.calls.user_message(caller, speech).await?;

    let Some(answer) = bounded_llm(state.llm.yes_no_question(
        speech,
        "Der Kunde wurde gefragt ob er verbunden werden möchte.",
    ))
    .await?
    else {
        return Ok(llm_timeout_fallback(state, ctx).await);
    };

    state
        .calls
        .ai_message(
            caller,
            &format!(
                "<Connection request: {}. Reasoning: {}>",
                answer.value.is_agreement, answer.value.reasoning
            ),
            Some(answer.duration),
            Some(&answer.source),
        )
        .await?;

    let announcements = state.settings.announcements(&ctx.service).await?;

    if !answer.value.is_agreement {
        state
            .calls
            .save_job_info(caller, "Verbindung akzeptiert", "Nein")
            .await?;
        state
            .calls
            .save_job_info(caller, "hangup_reason", "Agent hat das Gespräch beendet")
            .await?;
        let mut response = new_response(state);
        narrate(state, &mut response, caller, &announcements.connection_declined).await;
        response.hangup();
        return Ok(xml_response(&response));
    }

    state
        .calls
        .save_job_info(caller, "Verbindung akzeptiert", "Ja")
        .await?;

    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.transfer_message).await;
    match start_transfer(state, &mut response, caller, &ctx.service).await? {
        TransferStart::Dialing => {}
        TransferStart::NoMoreAgents => {
            narrate(state, &mut response, caller, &announcements.no_agents_available).await;
            state
                .calls
                .save_job_info(caller, "hangup_reason", "Keine Kontakte verfügbar")
                .await?;
            response.hangup();
        }
    }
    Ok(xml_response(&response))
}
