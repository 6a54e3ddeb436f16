//! Environment-driven configuration.
//!
//! The agent is configured entirely from the process environment; the
//! per-service runtime settings (pricing, announcements, locations) live in
//! the state store instead and are modeled in [`crate::settings`].

use crate::error::{Error, Result};

/// Severity of a configuration finding. Errors abort startup, warnings are
/// logged and tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ───────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Public base URL used in webhook actions and SMS links.
    pub server_url: String,
    pub dashboard_url: Option<String>,

    // ── State store ──────────────────────────────────────────────
    pub redis_url: String,

    // ── Telephony ────────────────────────────────────────────────
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    /// Outbound SMS/call sender number (E.164).
    pub twilio_phone_number: String,
    /// Read-only recording account, used only for media downloads.
    pub twilio_account_sid_ro: String,
    pub twilio_auth_token_ro: String,

    // ── Geo ──────────────────────────────────────────────────────
    pub maps_api_key: String,
    pub routes_api_key: String,

    // ── LLM providers ────────────────────────────────────────────
    pub xai_api_key: String,
    pub xai_model: String,
    pub baseten_api_key: String,
    pub baseten_base_url: String,
    pub baseten_model: String,

    // ── Speech ───────────────────────────────────────────────────
    pub elevenlabs_api_key: String,
    pub elevenlabs_stt_model: String,
    pub elevenlabs_stt_url: String,
    /// Voice identifier passed to the telephony `<Say>` verb.
    pub voice: String,

    // ── Misc ─────────────────────────────────────────────────────
    pub cache_root: String,
    /// OIDC issuer whose userinfo endpoint validates dashboard tokens.
    pub oidc_issuer: String,
    /// Skips dashboard auth entirely. Local development only.
    pub dev_mode: bool,
    /// Service ids this deployment answers for, in resolution order.
    pub services: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env_or("PORT", "8080")
            .parse::<u16>()
            .map_err(|_| Error::Config("PORT must be a valid port number".into()))?;

        let services = env_or(
            "SERVICES",
            "schluessel-allgaeu,notdienst-schluessel,notdienst-abschlepp",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port,
            server_url: env_or("SERVER_URL", "http://localhost:8080"),
            dashboard_url: std::env::var("DASHBOARD_URL").ok(),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            twilio_account_sid: env_or("TWILIO_ACCOUNT_SID", ""),
            twilio_auth_token: env_or("TWILIO_AUTH_TOKEN", ""),
            twilio_phone_number: env_or("TWILIO_PHONE_NUMBER", ""),
            twilio_account_sid_ro: env_or("TWILIO_ACCOUNT_SID_RO", ""),
            twilio_auth_token_ro: env_or("TWILIO_AUTH_TOKEN_RO", ""),
            maps_api_key: env_or("MAPS_API_KEY", ""),
            routes_api_key: env_or("ROUTES_API_KEY", ""),
            xai_api_key: env_or("XAI_API_KEY", ""),
            xai_model: env_or("XAI_MODEL", "grok-4-fast-non-reasoning"),
            baseten_api_key: env_or("BASETEN_API_KEY", ""),
            baseten_base_url: env_or("BASETEN_BASE_URL", "https://inference.baseten.co/v1"),
            baseten_model: env_or("BASETEN_MODEL", "openai/gpt-oss-120b"),
            elevenlabs_api_key: env_or("ELEVENLABS_API_KEY", ""),
            elevenlabs_stt_model: env_or("ELEVENLABS_STT_MODEL", "scribe_v2"),
            elevenlabs_stt_url: env_or(
                "ELEVENLABS_STT_URL",
                "https://api.elevenlabs.io/v1/speech-to-text",
            ),
            voice: env_or("VOICE", "Google.de-DE-Chirp3-HD-Charon"),
            cache_root: env_or("CACHE_ROOT", "./cache"),
            oidc_issuer: env_or("OIDC_ISSUER", "https://auth.pabst-andreas.de"),
            dev_mode: env_or("DEV_MODE", "false").to_lowercase() == "true",
            services,
        })
    }

    /// Sanity-check the configuration. Missing credentials degrade the
    /// matching subsystem, so most findings are warnings; only settings
    /// that make the server unusable are errors.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut warn = |message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message,
            })
        };

        if self.server_url.starts_with("http://localhost") {
            warn("SERVER_URL points at localhost — telephony callbacks will not reach this server".into());
        }
        if self.twilio_account_sid.is_empty() || self.twilio_auth_token.is_empty() {
            warn("Twilio credentials missing — SMS, recording and outbound calls disabled".into());
        }
        if self.twilio_account_sid_ro.is_empty() {
            warn("read-only recording credentials missing — recording ingest disabled".into());
        }
        if self.maps_api_key.is_empty() {
            warn("MAPS_API_KEY missing — geocoding disabled".into());
        }
        if self.routes_api_key.is_empty() {
            warn("ROUTES_API_KEY missing — pricing disabled".into());
        }
        if self.xai_api_key.is_empty() && self.baseten_api_key.is_empty() {
            warn("no LLM provider key configured — every call falls through to transfer".into());
        }
        if self.services.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "SERVICES must name at least one service id".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_services_is_an_error() {
        let mut config = Config::from_env().unwrap();
        config.services.clear();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("SERVICES")));
    }

    #[test]
    fn default_services_parse() {
        let config = Config::from_env().unwrap();
        assert!(!config.services.is_empty());
    }
}
