//! The conversational state machine.
//!
//! Each webhook endpoint is one state handler: it reads the form the
//! telephony provider posted, mutates the call store, and answers with a
//! TwiML document describing the next caller interaction. The machine is
//! memoryless across requests — all continuation data lives in the store.
//!
//! Error policy (applies to every handler): external failures and store
//! errors never surface as non-200 responses. They fall through to the
//! "transfer to a human" path, and only if even that fails does the caller
//! hear the technical-error apology.

pub mod address;
pub mod entry;
pub mod plz;
pub mod pricing;
pub mod transfer;

use std::time::Duration;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use nd_domain::{CallContext, CallerId, Error, Result};

use crate::state::AppState;
use crate::transfer::{ensure_queue, start_transfer, TransferStart};
use crate::twiml::VoiceResponse;

/// Wall-clock ceiling for any LLM call made from a handler.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(6);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook form
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The fields of interest from a telephony webhook. Twilio posts many
/// more; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallForm {
    #[serde(rename = "Caller")]
    pub caller: Option<String>,
    #[serde(rename = "Called")]
    pub called: Option<String>,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
    #[serde(rename = "DialCallStatus")]
    pub dial_call_status: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: Option<String>,
    #[serde(rename = "RecordingDuration")]
    pub recording_duration: Option<String>,
    #[serde(rename = "RecordingStatus")]
    pub recording_status: Option<String>,
}

impl CallForm {
    /// The customer's number. On outbound legs our own number appears as
    /// the caller, so the roles flip.
    pub fn caller_id(&self, agent_number: &str) -> CallerId {
        let raw = match (&self.caller, &self.called) {
            (Some(caller), Some(called))
                if !agent_number.is_empty() && caller == agent_number =>
            {
                called.clone()
            }
            (Some(caller), _) => caller.clone(),
            (None, _) => String::new(),
        };
        CallerId::parse(&raw)
    }

    pub fn speech(&self) -> &str {
        self.speech_result.as_deref().unwrap_or("")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render TwiML with the right content type. Always 200.
pub fn xml_response(response: &VoiceResponse) -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        response.to_xml(),
    )
        .into_response()
}

pub fn new_response(state: &AppState) -> VoiceResponse {
    VoiceResponse::new(&state.config.voice)
}

/// Resolve the call context. The service comes from the call root when the
/// call is initialized, otherwise from the dialed number; a configuration
/// gap falls back to the first service so the caller is never dropped.
pub async fn call_context(state: &AppState, form: &CallForm) -> CallContext {
    let caller = form.caller_id(&state.config.twilio_phone_number);

    if let Ok(Some(service)) = state.calls.get_service(caller.key()).await {
        return CallContext { caller, service };
    }

    let called = form.called.as_deref().unwrap_or("");
    match state
        .settings
        .resolve_service(&state.config.services, called)
        .await
    {
        Ok(Some(service)) => CallContext { caller, service },
        _ => {
            let service = state.config.services[0].clone();
            tracing::warn!(called, %service, "service not resolvable, using default");
            CallContext { caller, service }
        }
    }
}

/// Speak to the caller and mirror the prompt into the transcript.
/// Transcript failures are logged, never fatal.
pub async fn narrate(state: &AppState, response: &mut VoiceResponse, caller: &str, text: &str) {
    response.say(text);
    if let Err(e) = state.calls.agent_message(caller, text).await {
        tracing::warn!(caller, error = %e, "transcript write failed");
    }
}

/// Announce a transfer and dial the next contact in the queue, populating
/// the default queue first when none exists. Queue exhaustion ends the
/// call with the apology.
pub async fn transfer_with_message(
    state: &AppState,
    ctx: &CallContext,
    message: Option<&str>,
) -> Response {
    let caller = ctx.caller.key();
    let announcements = state
        .settings
        .announcements(&ctx.service)
        .await
        .unwrap_or_default();

    let mut response = new_response(state);
    let text = message.unwrap_or(&announcements.transfer_message);
    narrate(state, &mut response, caller, text).await;

    if let Err(e) = ensure_queue(state, caller, &ctx.service).await {
        tracing::error!(caller, error = %e, "queue population failed");
    }

    match start_transfer(state, &mut response, caller, &ctx.service).await {
        Ok(TransferStart::Dialing) => {}
        Ok(TransferStart::NoMoreAgents) => {
            narrate(state, &mut response, caller, &announcements.no_agents_available).await;
            let _ = state
                .calls
                .save_job_info(caller, "hangup_reason", "Keine Mitarbeiter erreichbar")
                .await;
            response.hangup();
        }
        Err(e) => {
            tracing::error!(caller, error = %e, "transfer start failed");
            narrate(state, &mut response, caller, &announcements.no_agents_available).await;
            response.hangup();
        }
    }

    xml_response(&response)
}

/// Map an inner-handler error to the caller-safe response: human-agent
/// requests and everything else both route to transfer, with different
/// transcript notes.
pub async fn error_fallback(state: &AppState, ctx: &CallContext, error: Error) -> Response {
    let caller = ctx.caller.key();
    match error {
        Error::HumanRequested => {
            let _ = state
                .calls
                .ai_message(caller, "<User requested human agent>", Some(0.0), None)
                .await;
            transfer_with_message(state, ctx, None).await
        }
        e => {
            tracing::error!(caller, error = %e, "handler failed, transferring to human");
            transfer_with_message(state, ctx, None).await
        }
    }
}

/// Bound an LLM future with the handler ceiling. `Ok(None)` means the
/// ceiling was hit; the background work is dropped with the future.
pub async fn bounded_llm<T, F>(future: F) -> Result<Option<T>>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(LLM_TIMEOUT, future).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

/// Record the timeout transcript note and fall through to transfer.
pub async fn llm_timeout_fallback(state: &AppState, ctx: &CallContext) -> Response {
    let _ = state
        .calls
        .ai_message(ctx.caller.key(), "<Request timed out>", Some(6.0), None)
        .await;
    transfer_with_message(state, ctx, None).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spoken helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const GERMAN_DIGITS: [&str; 10] = [
    "null", "eins", "zwei", "drei", "vier", "fünf", "sechs", "sieben", "acht", "neun",
];

/// Spell a postal code digit-by-digit for the confirmation prompt
/// ("87435" -> "acht sieben vier drei fünf").
pub fn spell_digits(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| GERMAN_DIGITS[d as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_uses_caller_field() {
        let form = CallForm {
            caller: Some("+49176".into()),
            called: Some("+49100".into()),
            ..Default::default()
        };
        assert_eq!(form.caller_id("+49100"), CallerId::Known("+49176".into()));
    }

    #[test]
    fn caller_id_flips_on_outbound_leg() {
        let form = CallForm {
            caller: Some("+49100".into()),
            called: Some("+49176".into()),
            ..Default::default()
        };
        assert_eq!(form.caller_id("+49100"), CallerId::Known("+49176".into()));
    }

    #[test]
    fn caller_id_anonymous() {
        let form = CallForm {
            caller: Some("anonymous".into()),
            ..Default::default()
        };
        assert_eq!(form.caller_id("+49100"), CallerId::Anonymous);
        assert_eq!(CallForm::default().caller_id("+49100"), CallerId::Anonymous);
    }

    #[test]
    fn digit_spelling() {
        assert_eq!(spell_digits("87435"), "acht sieben vier drei fünf");
        assert_eq!(spell_digits("90"), "neun null");
        assert_eq!(spell_digits("a1b"), "eins");
        assert_eq!(spell_digits(""), "");
    }
}
