//! Key layout, TTLs, and the phone-number codec.
//!
//! Everything call-scoped lives under `callers:{E164}:…`; configuration and
//! location-share links live under `notdienststation:…`. Recording keys and
//! URL path segments carry the caller with `+` encoded as a leading `00`.

/// TTL of transient call keys (service, start time, job info, location,
/// queue, transcription).
pub const TTL_TRANSIENT: u64 = 3_600;

/// TTL of conversation artifacts that outlive the call (messages,
/// recordings, transferred-to, shared locations, share links).
pub const TTL_PERSISTENT: u64 = 86_400;

/// TTL of cached dashboard auth tokens (7 days).
pub const TTL_AUTH_TOKEN: u64 = 7 * 24 * 3_600;

pub const CONFIG_PREFIX: &str = "notdienststation:config";
pub const LINK_COUNTER_KEY: &str = "notdienststation:standort_letzte_id";

// ── Phone codec ──────────────────────────────────────────────────

/// Encode an E.164 number for use in keys and URL path segments:
/// the leading `+` becomes `00`.
pub fn encode_phone(phone: &str) -> String {
    match phone.strip_prefix('+') {
        Some(rest) => format!("00{rest}"),
        None => phone.to_string(),
    }
}

/// Reverse of [`encode_phone`]: a leading `00` becomes `+`.
pub fn decode_phone(encoded: &str) -> String {
    match encoded.strip_prefix("00") {
        Some(rest) => format!("+{rest}"),
        None => encoded.to_string(),
    }
}

// ── Timestamps ───────────────────────────────────────────────────

/// Call start timestamp, Berlin local time, `YYYYMMDDTHHMMSS`.
pub fn call_timestamp_now() -> String {
    chrono::Utc::now()
        .with_timezone(&chrono_tz::Europe::Berlin)
        .format("%Y%m%dT%H%M%S")
        .to_string()
}

// ── Key builders ─────────────────────────────────────────────────

pub fn caller_key(caller: &str, suffix: &str) -> String {
    format!("callers:{caller}:{suffix}")
}

pub fn job_key(caller: &str, field: &str) -> String {
    format!("callers:{caller}:job:{field}")
}

pub fn recording_key(encoded_phone: &str, timestamp: &str, recording_type: &str) -> String {
    format!("recordings:{encoded_phone}:{timestamp}:{recording_type}")
}

pub fn link_key(link_id: i64) -> String {
    format!("notdienststation:standort_link:{link_id}")
}

pub fn auth_token_key(token_hash: &str) -> String {
    format!("notdienststation:auth_token:{token_hash}")
}

pub fn service_config_key(service: &str, field: &str) -> String {
    format!("{CONFIG_PREFIX}:{service}:{field}")
}

pub fn locations_key(service: &str) -> String {
    format!("{CONFIG_PREFIX}:locations:{service}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_codec_is_bijective() {
        for phone in ["+4917612345678", "+49111", "+12125550100"] {
            assert_eq!(decode_phone(&encode_phone(phone)), phone);
        }
        for encoded in ["004917612345678", "0049111"] {
            assert_eq!(encode_phone(&decode_phone(encoded)), encoded);
        }
    }

    #[test]
    fn encode_without_plus_is_identity() {
        assert_eq!(encode_phone("anonymous"), "anonymous");
        assert_eq!(encode_phone(""), "");
    }

    #[test]
    fn timestamp_shape() {
        let ts = call_timestamp_now();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "T");
        assert!(ts[..8].chars().all(|c| c.is_ascii_digit()));
        assert!(ts[9..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            caller_key("+49176", "messages"),
            "callers:+49176:messages"
        );
        assert_eq!(job_key("+49176", "Preis"), "callers:+49176:job:Preis");
        assert_eq!(
            recording_key("0049176", "20260801T120000", "initial"),
            "recordings:0049176:20260801T120000:initial"
        );
        assert_eq!(
            link_key(17),
            "notdienststation:standort_link:17"
        );
    }
}
