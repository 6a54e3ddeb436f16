//! Call entry: `/incoming-call`, `/parse-intent-1`, `/parse-intent-2`.

use axum::extract::{Form, State};
use axum::response::Response;
use chrono::Timelike;

use nd_domain::{CallContext, Intent, Result};
use nd_store::keys::encode_phone;

use crate::state::AppState;
use crate::twiml::Gather;

use super::{
    call_context, error_fallback, bounded_llm, llm_timeout_fallback, narrate, new_response,
    transfer_with_message, xml_response, CallForm,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /incoming-call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn incoming_call(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match incoming_call_inner(&state, &ctx, &form).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn incoming_call_inner(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
) -> Result<Response> {
    let caller = ctx.caller.key();
    tracing::info!(caller, service = %ctx.service, call_sid = ?form.call_sid, "incoming call");

    // Direct forwarding window: dial straight through, skip the flow.
    // Vacation mode suppresses it.
    let vacation = state.settings.vacation_mode().await?;
    let forwarding = state.settings.direct_forwarding(&ctx.service).await?;
    if !vacation.active {
        let berlin = chrono::Utc::now().with_timezone(&chrono_tz::Europe::Berlin);
        let hour = f64::from(berlin.hour()) + f64::from(berlin.minute()) / 60.0;
        if forwarding.applies_at(hour) {
            tracing::info!(caller, forward = %forwarding.forward_phone, "direct forwarding active");
            let mut response = new_response(state);
            response.dial(
                forwarding.forward_phone.clone(),
                None,
                None,
                Some(state.config.twilio_phone_number.clone()),
            );
            return Ok(xml_response(&response));
        }
    }

    // Drop transient leftovers of an earlier call before re-initializing.
    // Messages, recordings, transferred-to and intent survive and feed the
    // repeat-caller paths below.
    state.calls.cleanup_call(caller).await?;
    state.calls.init_new_call(caller, &ctx.service).await?;

    // Repeat caller: straight back to the contact who took the last call.
    if let Some(previous) = state.calls.get_transferred_to(caller).await? {
        state
            .calls
            .save_job_info(caller, "Zuvor Angerufen", "Ja")
            .await?;
        state
            .calls
            .save_job_info(caller, "Zuvor weitergeleitet an", &previous.name)
            .await?;
        state
            .calls
            .add_to_caller_queue(caller, &previous.name, &previous.phone)
            .await?;
        return Ok(transfer_with_message(state, ctx, None).await);
    }

    // Known intent from an earlier call: skip greeting, go to transfer.
    if let Some(intent) = state.calls.get_intent(caller).await? {
        state
            .calls
            .save_job_info(caller, "Zuvor Angerufen", "Ja")
            .await?;
        state
            .calls
            .save_job_info(caller, "Vorheriges Anliegen", &intent)
            .await?;
        if matches!(
            Intent::parse(&intent),
            Intent::Schluesseldienst | Intent::Abschleppdienst
        ) {
            return Ok(transfer_with_message(state, ctx, None).await);
        }
    }

    // Recording runs in the background; anonymous callers stay unrecorded.
    if let (false, Some(call_sid)) = (ctx.caller.is_anonymous(), form.call_sid.clone()) {
        let twilio = state.twilio.clone();
        let encoded = encode_phone(caller);
        tokio::spawn(async move {
            if let Err(e) = twilio.start_recording(&call_sid, &encoded).await {
                tracing::warn!(%call_sid, error = %e, "recording not started");
            }
        });
    }

    greeting(state, ctx).await
}

/// Welcome prompt inviting the caller to describe the problem. Two gather
/// rounds; silence falls through to the human transfer.
async fn greeting(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.greeting).await;
    response.gather(Gather::speech("/parse-intent-1", 15));
    response.say(announcements.greeting_prompt.clone());
    response.gather(Gather::speech("/parse-intent-1", 15));
    append_silence_fallback(state, ctx, &mut response).await;
    Ok(xml_response(&response))
}

/// Verbs reached only when every gather timed out: apologize and dial.
async fn append_silence_fallback(
    state: &AppState,
    ctx: &CallContext,
    response: &mut crate::twiml::VoiceResponse,
) {
    let caller = ctx.caller.key();
    narrate(
        state,
        response,
        caller,
        "Leider konnte ich keine Eingabe erkennen. Ich verbinde dich mit einem Mitarbeiter.",
    )
    .await;
    if let Err(e) = crate::transfer::ensure_queue(state, caller, &ctx.service).await {
        tracing::error!(caller, error = %e, "queue population failed");
    }
    if let Err(e) = crate::transfer::start_transfer(state, response, caller, &ctx.service).await {
        tracing::error!(caller, error = %e, "silence fallback transfer failed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /parse-intent-1 and /parse-intent-2
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn parse_intent_1(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match parse_intent(&state, &ctx, &form, true).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

pub async fn parse_intent_2(State(state): State<AppState>, Form(form): Form<CallForm>) -> Response {
    let ctx = call_context(&state, &form).await;
    match parse_intent(&state, &ctx, &form, false).await {
        Ok(response) => response,
        Err(e) => error_fallback(&state, &ctx, e).await,
    }
}

async fn parse_intent(
    state: &AppState,
    ctx: &CallContext,
    form: &CallForm,
    first_attempt: bool,
) -> Result<Response> {
    let caller = ctx.caller.key();
    let speech = form.speech();
    state.calls.user_message(caller, speech).await?;

    let Some(answer) = bounded_llm(state.llm.classify_intent(speech)).await? else {
        return Ok(llm_timeout_fallback(state, ctx).await);
    };

    let intent = answer.value.intent();
    state
        .calls
        .ai_message(
            caller,
            &format!(
                "<Request classified as {intent}. Reasoning: {}>",
                answer.value.reasoning
            ),
            Some(answer.duration),
            Some(&answer.source),
        )
        .await?;

    match intent {
        Intent::Schluesseldienst | Intent::Abschleppdienst => {
            state.calls.set_intent(caller, intent.as_str()).await?;
            let mut response = new_response(state);
            response.redirect("/ask-adress");
            Ok(xml_response(&response))
        }
        Intent::Adac | Intent::Mitarbeiter => Ok(transfer_with_message(state, ctx, None).await),
        Intent::Andere if first_attempt => intent_not_understood(state, ctx).await,
        Intent::Andere => Ok(transfer_with_message(
            state,
            ctx,
            Some("Leider konnte ich dein Anliegen wieder nicht verstehen. Ich verbinde dich mit einem Mitarbeiter."),
        )
        .await),
    }
}

/// Second chance after an inconclusive classification.
async fn intent_not_understood(state: &AppState, ctx: &CallContext) -> Result<Response> {
    let caller = ctx.caller.key();
    let announcements = state.settings.announcements(&ctx.service).await?;

    let mut response = new_response(state);
    narrate(state, &mut response, caller, &announcements.intent_not_understood).await;
    response.gather(Gather::speech("/parse-intent-2", 15));
    response.say(announcements.greeting_prompt.clone());
    response.gather(Gather::speech("/parse-intent-2", 15));
    append_silence_fallback(state, ctx, &mut response).await;
    Ok(xml_response(&response))
}
