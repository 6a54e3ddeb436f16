//! Telephony-XML (TwiML) construction.
//!
//! The webhook handlers answer every request with a small XML document of
//! verbs. The builder covers exactly the verbs the flow uses — Say, Gather,
//! Record, Dial, Redirect, Hangup — and escapes all text and attribute
//! content.

use std::fmt::Write;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verbs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherInput {
    Speech,
    Dtmf,
    DtmfAndSpeech,
}

impl GatherInput {
    fn as_str(&self) -> &'static str {
        match self {
            GatherInput::Speech => "speech",
            GatherInput::Dtmf => "dtmf",
            GatherInput::DtmfAndSpeech => "dtmf speech",
        }
    }
}

/// A `<Gather>` that speaks its prompts while listening.
#[derive(Debug, Clone)]
pub struct Gather {
    pub input: GatherInput,
    pub action: String,
    pub timeout: u32,
    pub num_digits: Option<u32>,
    pub prompts: Vec<String>,
}

impl Gather {
    pub fn speech(action: impl Into<String>, timeout: u32) -> Self {
        Self {
            input: GatherInput::Speech,
            action: action.into(),
            timeout,
            num_digits: None,
            prompts: Vec::new(),
        }
    }

    pub fn dtmf(action: impl Into<String>, timeout: u32, num_digits: u32) -> Self {
        Self {
            input: GatherInput::Dtmf,
            action: action.into(),
            timeout,
            num_digits: Some(num_digits),
            prompts: Vec::new(),
        }
    }

    pub fn dtmf_and_speech(action: impl Into<String>, timeout: u32, num_digits: u32) -> Self {
        Self {
            input: GatherInput::DtmfAndSpeech,
            action: action.into(),
            timeout,
            num_digits: Some(num_digits),
            prompts: Vec::new(),
        }
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompts.push(text.into());
        self
    }
}

#[derive(Debug, Clone)]
enum Verb {
    Say(String),
    Gather(Gather),
    Record {
        action: String,
        timeout: u32,
        max_length: u32,
    },
    Dial {
        number: String,
        action: Option<String>,
        timeout: Option<u32>,
        caller_id: Option<String>,
    },
    Redirect(String),
    Hangup,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered verb list rendered as one `<Response>` document.
#[derive(Debug, Clone)]
pub struct VoiceResponse {
    voice: String,
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            verbs: Vec::new(),
        }
    }

    pub fn say(&mut self, text: impl Into<String>) -> &mut Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn gather(&mut self, gather: Gather) -> &mut Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn record(&mut self, action: impl Into<String>, timeout: u32, max_length: u32) -> &mut Self {
        self.verbs.push(Verb::Record {
            action: action.into(),
            timeout,
            max_length,
        });
        self
    }

    pub fn dial(
        &mut self,
        number: impl Into<String>,
        action: Option<String>,
        timeout: Option<u32>,
        caller_id: Option<String>,
    ) -> &mut Self {
        self.verbs.push(Verb::Dial {
            number: number.into(),
            action,
            timeout,
            caller_id,
        });
        self
    }

    pub fn redirect(&mut self, url: impl Into<String>) -> &mut Self {
        self.verbs.push(Verb::Redirect(url.into()));
        self
    }

    pub fn hangup(&mut self) -> &mut Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            self.write_verb(&mut xml, verb);
        }
        xml.push_str("</Response>");
        xml
    }

    fn write_say(&self, xml: &mut String, text: &str) {
        let _ = write!(
            xml,
            "<Say voice=\"{}\" language=\"de-DE\">{}</Say>",
            escape(&self.voice),
            escape(text)
        );
    }

    fn write_verb(&self, xml: &mut String, verb: &Verb) {
        match verb {
            Verb::Say(text) => self.write_say(xml, text),
            Verb::Gather(gather) => {
                let _ = write!(
                    xml,
                    "<Gather input=\"{}\" action=\"{}\" timeout=\"{}\"",
                    gather.input.as_str(),
                    escape(&gather.action),
                    gather.timeout
                );
                if let Some(num_digits) = gather.num_digits {
                    let _ = write!(xml, " numDigits=\"{num_digits}\"");
                }
                if gather.input != GatherInput::Dtmf {
                    xml.push_str(" language=\"de-DE\" speechTimeout=\"auto\"");
                }
                xml.push('>');
                for prompt in &gather.prompts {
                    self.write_say(xml, prompt);
                }
                xml.push_str("</Gather>");
            }
            Verb::Record {
                action,
                timeout,
                max_length,
            } => {
                let _ = write!(
                    xml,
                    "<Record action=\"{}\" timeout=\"{timeout}\" maxLength=\"{max_length}\" playBeep=\"false\"/>",
                    escape(action)
                );
            }
            Verb::Dial {
                number,
                action,
                timeout,
                caller_id,
            } => {
                xml.push_str("<Dial");
                if let Some(action) = action {
                    let _ = write!(xml, " action=\"{}\"", escape(action));
                }
                if let Some(timeout) = timeout {
                    let _ = write!(xml, " timeout=\"{timeout}\"");
                }
                if let Some(caller_id) = caller_id {
                    let _ = write!(xml, " callerId=\"{}\"", escape(caller_id));
                }
                let _ = write!(xml, "><Number>{}</Number></Dial>", escape(number));
            }
            Verb::Redirect(url) => {
                let _ = write!(xml, "<Redirect>{}</Redirect>", escape(url));
            }
            Verb::Hangup => xml.push_str("<Hangup/>"),
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICE: &str = "Google.de-DE-Chirp3-HD-Charon";

    #[test]
    fn say_and_hangup() {
        let mut response = VoiceResponse::new(VOICE);
        response.say("Hallo").hangup();
        assert_eq!(
            response.to_xml(),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
                 <Say voice=\"{VOICE}\" language=\"de-DE\">Hallo</Say><Hangup/></Response>"
            )
        );
    }

    #[test]
    fn text_is_escaped() {
        let mut response = VoiceResponse::new(VOICE);
        response.say("Müller & Söhne <GmbH>");
        let xml = response.to_xml();
        assert!(xml.contains("Müller &amp; Söhne &lt;GmbH&gt;"));
    }

    #[test]
    fn speech_gather_carries_language_and_prompts() {
        let mut response = VoiceResponse::new(VOICE);
        response.gather(
            Gather::speech("/parse-intent-1", 15).prompt("Wie kann ich dir helfen?"),
        );
        let xml = response.to_xml();
        assert!(xml.contains(
            "<Gather input=\"speech\" action=\"/parse-intent-1\" timeout=\"15\" \
             language=\"de-DE\" speechTimeout=\"auto\">"
        ));
        assert!(xml.contains("Wie kann ich dir helfen?</Say></Gather>"));
    }

    #[test]
    fn dtmf_gather_has_digits_but_no_speech_attrs() {
        let mut response = VoiceResponse::new(VOICE);
        response.gather(Gather::dtmf("/process-plz", 10, 5));
        let xml = response.to_xml();
        assert!(xml.contains("input=\"dtmf\""));
        assert!(xml.contains("numDigits=\"5\""));
        assert!(!xml.contains("speechTimeout"));
    }

    #[test]
    fn dial_with_callback() {
        let mut response = VoiceResponse::new(VOICE);
        response.dial(
            "+49111",
            Some("/parse-transfer-call/Alice/%2B49111".into()),
            Some(15),
            None,
        );
        let xml = response.to_xml();
        assert!(xml.contains(
            "<Dial action=\"/parse-transfer-call/Alice/%2B49111\" timeout=\"15\">\
             <Number>+49111</Number></Dial>"
        ));
    }

    #[test]
    fn record_and_redirect() {
        let mut response = VoiceResponse::new(VOICE);
        response
            .record("/process-address", 4, 10)
            .redirect("/address-processed");
        let xml = response.to_xml();
        assert!(xml.contains(
            "<Record action=\"/process-address\" timeout=\"4\" maxLength=\"10\" playBeep=\"false\"/>"
        ));
        assert!(xml.contains("<Redirect>/address-processed</Redirect>"));
    }
}
