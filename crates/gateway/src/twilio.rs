//! Twilio REST bindings: SMS, outbound calls, recording control, and media
//! download. Media downloads authenticate with the read-only recording
//! account; everything else uses the live account.

use std::time::Duration;

use nd_domain::{Error, Result};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";
const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    from_number: String,
    ro_account_sid: String,
    ro_auth_token: String,
    server_url: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: &nd_domain::config::Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            ro_account_sid: config.twilio_account_sid_ro.clone(),
            ro_auth_token: config.twilio_auth_token_ro.clone(),
            server_url: config.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_number(&self) -> &str {
        &self.from_number
    }

    async fn post_form(&self, url: String, form: &[(&str, &str)]) -> Result<()> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Telephony(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Telephony(format!("Twilio returned {status}: {detail}")));
        }
        Ok(())
    }

    // ── SMS ──────────────────────────────────────────────────────

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let url = format!("{API_BASE}/Accounts/{}/Messages.json", self.account_sid);
        self.post_form(url, &[("To", to), ("From", &self.from_number), ("Body", body)])
            .await?;
        tracing::info!(to, "sms sent");
        Ok(())
    }

    // ── Outbound calls ───────────────────────────────────────────

    /// Place an outbound call that immediately executes the given TwiML.
    pub async fn create_call(&self, to: &str, twiml: &str) -> Result<()> {
        let url = format!("{API_BASE}/Accounts/{}/Calls.json", self.account_sid);
        self.post_form(
            url,
            &[("To", to), ("From", &self.from_number), ("Twiml", twiml)],
        )
        .await?;
        tracing::info!(to, "outbound call created");
        Ok(())
    }

    // ── Recording control ────────────────────────────────────────

    /// Start recording the live call. Retried a few times because the call
    /// resource is not always immediately ready after the first webhook.
    pub async fn start_recording(&self, call_sid: &str, encoded_caller: &str) -> Result<()> {
        let url = format!(
            "{API_BASE}/Accounts/{}/Calls/{call_sid}/Recordings.json",
            self.account_sid
        );
        let callback = format!(
            "{}/recording-status-callback/{encoded_caller}?source=initial",
            self.server_url
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        let mut last_error = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self
                .post_form(
                    url.clone(),
                    &[
                        ("RecordingStatusCallback", callback.as_str()),
                        ("RecordingStatusCallbackEvent", "completed"),
                    ],
                )
                .await
            {
                Ok(()) => {
                    tracing::info!(call_sid, "call recording started");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(call_sid, attempt, error = %e, "recording start failed");
                    last_error = Some(e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Telephony("recording start failed".into())))
    }

    /// Download recording media with the read-only account. Up to three
    /// attempts with a one-second delay.
    pub async fn download_recording(&self, media_url: &str) -> Result<(Vec<u8>, String)> {
        let mut last_error = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            let result = self
                .client
                .get(media_url)
                .basic_auth(&self.ro_account_sid, Some(&self.ro_auth_token))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("audio/mpeg")
                        .to_string();
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| Error::Telephony(e.to_string()))?;
                    return Ok((bytes.to_vec(), content_type));
                }
                Ok(response) => {
                    last_error = Some(Error::Telephony(format!(
                        "recording download returned {}",
                        response.status()
                    )));
                }
                Err(e) => last_error = Some(Error::Telephony(e.to_string())),
            }
            tracing::warn!(media_url, attempt, "recording download failed, retrying");
            tokio::time::sleep(RETRY_DELAY).await;
        }
        Err(last_error.unwrap_or_else(|| Error::Telephony("recording download failed".into())))
    }
}

/// Media URL for a recording resource. Twilio reports the resource URL
/// either bare or with a `.json` suffix; the media lives at `.mp3`.
pub fn recording_media_url(recording_url: &str) -> String {
    match recording_url.strip_suffix(".json") {
        Some(base) => format!("{base}.mp3"),
        None => format!("{recording_url}.mp3"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_url_replaces_json_suffix() {
        assert_eq!(
            recording_media_url("https://api.twilio.com/recordings/RE1.json"),
            "https://api.twilio.com/recordings/RE1.mp3"
        );
        assert_eq!(
            recording_media_url("https://api.twilio.com/recordings/RE1"),
            "https://api.twilio.com/recordings/RE1.mp3"
        );
    }
}
