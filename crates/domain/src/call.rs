//! Call identity and transcript modeling.
//!
//! A call is keyed by the caller's E.164 number plus the Berlin-local start
//! timestamp assigned on the first webhook. Handlers carry a [`CallContext`]
//! instead of re-deriving identity from the request at every step.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Caller identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The caller as reported by the telephony provider.
///
/// Withheld numbers arrive as the literal string `"anonymous"`. Several
/// paths (SMS fallback, recording persistence) short-circuit on anonymous
/// callers, so the distinction is made explicit at the type level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerId {
    Known(String),
    Anonymous,
}

impl CallerId {
    /// Parse the `Caller` form field. Empty or withheld numbers map to
    /// [`CallerId::Anonymous`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("anonymous") {
            CallerId::Anonymous
        } else {
            CallerId::Known(trimmed.to_string())
        }
    }

    /// The storage key for this caller. Anonymous callers share one bucket
    /// that expires with the call.
    pub fn key(&self) -> &str {
        match self {
            CallerId::Known(number) => number,
            CallerId::Anonymous => "anonymous",
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, CallerId::Anonymous)
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Everything a flow handler needs to know about the current call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub caller: CallerId,
    /// Service id derived from the dialed number.
    pub service: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Classification of a caller utterance. The German wire strings are
/// canonical; everything unrecognized folds into [`Intent::Andere`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Schluesseldienst,
    Abschleppdienst,
    Adac,
    Mitarbeiter,
    Andere,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Schluesseldienst => "schlüsseldienst",
            Intent::Abschleppdienst => "abschleppdienst",
            Intent::Adac => "adac",
            Intent::Mitarbeiter => "mitarbeiter",
            Intent::Andere => "andere",
        }
    }

    /// Parse a classifier answer. Unknown classes fall back to `Andere`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "schlüsseldienst" => Intent::Schluesseldienst,
            "abschleppdienst" => Intent::Abschleppdienst,
            "adac" => Intent::Adac,
            "mitarbeiter" => Intent::Mitarbeiter,
            _ => Intent::Andere,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    User,
    Ai,
    Google,
    Twilio,
}

/// One transcript line. Appended-only; ordering is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_source: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            duration: None,
            model_source: None,
        }
    }

    /// A timed message carries a `" (took D.DDDs)"` suffix in its content
    /// and the raw duration (3 decimal places) as a field.
    pub fn timed(
        role: Role,
        content: &str,
        duration: Option<f64>,
        model_source: Option<String>,
    ) -> Self {
        Self {
            role,
            content: format_timed(content, duration),
            duration: duration.map(|d| (d * 1000.0).round() / 1000.0),
            model_source,
        }
    }
}

/// Append the duration suffix used for `ai`/`google` transcript lines.
pub fn format_timed(content: &str, duration: Option<f64>) -> String {
    match duration {
        Some(d) => format!("{content} (took {d:.3}s)"),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_parses_known_number() {
        assert_eq!(
            CallerId::parse("+4917612345678"),
            CallerId::Known("+4917612345678".into())
        );
    }

    #[test]
    fn caller_id_parses_anonymous_variants() {
        assert_eq!(CallerId::parse("anonymous"), CallerId::Anonymous);
        assert_eq!(CallerId::parse("Anonymous"), CallerId::Anonymous);
        assert_eq!(CallerId::parse(""), CallerId::Anonymous);
        assert_eq!(CallerId::parse("  "), CallerId::Anonymous);
    }

    #[test]
    fn intent_roundtrip() {
        for intent in [
            Intent::Schluesseldienst,
            Intent::Abschleppdienst,
            Intent::Adac,
            Intent::Mitarbeiter,
            Intent::Andere,
        ] {
            assert_eq!(Intent::parse(intent.as_str()), intent);
        }
    }

    #[test]
    fn intent_unknown_falls_back() {
        assert_eq!(Intent::parse("pizza service"), Intent::Andere);
        assert_eq!(Intent::parse(""), Intent::Andere);
    }

    #[test]
    fn timed_suffix_formatting() {
        assert_eq!(format_timed("hello", Some(1.5)), "hello (took 1.500s)");
        assert_eq!(format_timed("msg", Some(0.0)), "msg (took 0.000s)");
        assert_eq!(format_timed("hello", None), "hello");
    }

    #[test]
    fn message_serializes_without_empty_fields() {
        let msg = Message::new(Role::User, "hallo");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("duration").is_none());
        assert!(json.get("model_source").is_none());
    }
}
