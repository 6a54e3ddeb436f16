//! Webhook gateway for the Notdienststation voice agent: the call flow
//! state machine, TwiML construction, the transfer coordinator, and the
//! bindings to telephony, speech, and the dashboard.

pub mod api;
pub mod speech;
pub mod state;
pub mod transfer;
pub mod twilio;
pub mod twiml;
