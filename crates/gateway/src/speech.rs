//! Speech-to-text binding.
//!
//! The address turn is captured as a recording; transcription runs in a
//! detached task and lands in the call store, where `/address-processed`
//! polls for it. The vendor fetches the media itself via a
//! credentialed cloud-storage URL, so no audio passes through this
//! process.

use nd_domain::{Error, Result};

pub struct SpeechClient {
    api_key: String,
    model: String,
    url: String,
    ro_account_sid: String,
    ro_auth_token: String,
    client: reqwest::Client,
}

impl SpeechClient {
    pub fn new(config: &nd_domain::config::Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_key: config.elevenlabs_api_key.clone(),
            model: config.elevenlabs_stt_model.clone(),
            url: config.elevenlabs_stt_url.clone(),
            ro_account_sid: config.twilio_account_sid_ro.clone(),
            ro_auth_token: config.twilio_auth_token_ro.clone(),
            client,
        })
    }

    /// Transcribe the recording at the given Twilio media URL.
    pub async fn transcribe(&self, recording_url: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Config("ELEVENLABS_API_KEY is not set".into()));
        }

        let bare_url = recording_url
            .strip_prefix("https://")
            .unwrap_or(recording_url);
        let cloud_storage_url = format!(
            "https://{}:{}@{bare_url}",
            self.ro_account_sid, self.ro_auth_token
        );

        let response = self
            .client
            .post(&self.url)
            .header("xi-api-key", &self.api_key)
            .form(&[
                ("model_id", self.model.as_str()),
                ("language_code", "deu"),
                ("tag_audio_events", "false"),
                ("cloud_storage_url", cloud_storage_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "transcription failed with {status}: {detail}"
            )));
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(payload["text"].as_str().unwrap_or_default().to_string())
    }
}
