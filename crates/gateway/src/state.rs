//! Shared application state handed to every handler.

use std::sync::Arc;

use nd_domain::config::Config;
use nd_geo::{GeocodeClient, RoutesClient};
use nd_llm::{BytesCache, LlmOrchestrator};
use nd_store::{CallStore, LinkStore, RecordingStore, SettingsStore};

use crate::speech::SpeechClient;
use crate::twilio::TwilioClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub calls: CallStore,
    pub recordings: RecordingStore,
    pub links: LinkStore,
    pub settings: SettingsStore,
    pub llm: Arc<LlmOrchestrator>,
    pub geocoder: Arc<GeocodeClient>,
    pub routes: Arc<RoutesClient>,
    pub twilio: Arc<TwilioClient>,
    pub speech: Arc<SpeechClient>,
    /// TTS snippets served by `/audio/{key}.mp3`.
    pub audio_cache: Arc<BytesCache>,
    /// Plain HTTP client for auth userinfo lookups.
    pub http: reqwest::Client,
}
