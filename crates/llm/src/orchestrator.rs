//! Conversational primitives on top of the race and the cache.
//!
//! Every primitive goes through [`LlmOrchestrator::cached_request`]:
//! identical prompts collapse to a cache hit with zero latency, and any raw
//! answer containing "mitarbeiter" aborts the flow with
//! [`Error::HumanRequested`] before parsing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use nd_domain::{Error, Intent, Result};

use crate::cache::{derive_cache_key, JsonCache};
use crate::race::LlmRace;

/// Ceiling for the uncached PLZ-correction consult.
const CORRECT_PLZ_TIMEOUT: Duration = Duration::from_secs(5);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Answer types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed answer plus provenance: elapsed seconds and the source tag
/// ("grok", "gpt", "cache", "unknown").
#[derive(Debug, Clone)]
pub struct Answer<T> {
    pub value: T,
    pub duration: f64,
    pub source: String,
}

impl<T> Answer<T> {
    fn cached(value: T) -> Self {
        Self {
            value,
            duration: 0.0,
            source: "cache".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YesNo {
    pub is_agreement: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub intent_str: String,
    pub reasoning: String,
}

impl Classification {
    pub fn intent(&self) -> Intent {
        Intent::parse(&self.intent_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LocationExtraction {
    pub contains_location: bool,
    pub contains_city: bool,
    pub knows_location: bool,
    pub address: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmOrchestrator {
    race: LlmRace,
    cache: Arc<JsonCache>,
}

impl LlmOrchestrator {
    pub fn new(race: LlmRace, cache: Arc<JsonCache>) -> Self {
        Self { race, cache }
    }

    /// Cache-through LLM request.
    ///
    /// On a hit, returns the stored parsed value with duration 0.0 and
    /// source "cache". On a miss, races the providers, screens the raw
    /// answer for the human-agent token, parses, stores, and returns the
    /// live result.
    pub async fn cached_request<T, F>(
        &self,
        namespace: &str,
        cache_input: &BTreeMap<String, String>,
        system_prompt: &str,
        user_prompt: &str,
        parse: F,
    ) -> Result<Answer<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&str) -> Result<T>,
    {
        let key = derive_cache_key(cache_input);
        if let Some(value) = self.cache.get(namespace, &key) {
            if let Ok(parsed) = serde_json::from_value::<T>(value) {
                tracing::debug!(namespace, %key, "llm cache hit");
                return Ok(Answer::cached(parsed));
            }
            tracing::warn!(namespace, %key, "cache entry no longer parseable, refreshing");
        }

        let start = Instant::now();
        let (raw, source) = self.race.ask(system_prompt, user_prompt).await;
        let duration = start.elapsed().as_secs_f64();

        if raw.to_lowercase().contains("mitarbeiter") {
            tracing::info!(namespace, "human agent requested in llm answer");
            return Err(Error::HumanRequested);
        }

        let parsed = parse(&raw)?;
        self.cache
            .set(namespace, &key, serde_json::to_value(&parsed)?);

        tracing::info!(namespace, source, duration, "llm request completed");
        Ok(Answer {
            value: parsed,
            duration,
            source: source.to_string(),
        })
    }

    // ── Primitives ───────────────────────────────────────────────

    /// Does the utterance agree with the question asked in `context`?
    pub async fn yes_no_question(&self, spoken_text: &str, context: &str) -> Result<Answer<YesNo>> {
        if spoken_text.trim().is_empty() {
            return Ok(Answer::cached(YesNo {
                is_agreement: false,
                reasoning: "Kein Text vorhanden.".into(),
            }));
        }

        let cache_input = cache_input(&[("context", context), ("text", spoken_text)]);
        let user_prompt = format!(
            "Kontext: \"{context}\"\nAntwort des Benutzers: \"{spoken_text}\". Zeigt dies eine bejahende Absicht?"
        );
        self.cached_request(
            "yes_no_question",
            &cache_input,
            YES_NO_SYSTEM_PROMPT,
            &user_prompt,
            |raw| Ok(parse_yes_no(raw)),
        )
        .await
    }

    /// Classify the caller's concern.
    pub async fn classify_intent(&self, spoken_text: &str) -> Result<Answer<Classification>> {
        if spoken_text.trim().is_empty() {
            return Ok(Answer::cached(Classification {
                intent_str: Intent::Andere.as_str().into(),
                reasoning: "Kein Text vorhanden.".into(),
            }));
        }

        let cache_input = cache_input(&[("text", spoken_text)]);
        let user_prompt = format!("Kategorisiere diese Anfrage: \"{spoken_text}\"");
        self.cached_request(
            "classify_intent",
            &cache_input,
            CLASSIFY_SYSTEM_PROMPT,
            &user_prompt,
            |raw| Ok(parse_classification(raw)),
        )
        .await
    }

    /// Extract address signals from a transcription.
    pub async fn process_location(
        &self,
        transcription: &str,
    ) -> Result<Answer<LocationExtraction>> {
        if transcription.trim().is_empty() {
            return Ok(Answer::cached(LocationExtraction::default()));
        }

        let cache_input = cache_input(&[("text", transcription)]);
        let user_prompt = format!("Text: \"{transcription}\"");
        self.cached_request(
            "process_location",
            &cache_input,
            PROCESS_LOCATION_SYSTEM_PROMPT,
            &user_prompt,
            |raw| Ok(parse_location_extraction(raw)),
        )
        .await
    }

    /// Ask for the missing postal code of a place. Uncached; bounded by a
    /// five-second ceiling; anything but a bare 4-or-5-digit answer is
    /// discarded.
    pub async fn correct_plz(
        &self,
        location_text: &str,
        latitude: f64,
        longitude: f64,
    ) -> Option<String> {
        if location_text.trim().is_empty() {
            return None;
        }

        let user_prompt = format!(
            "Ort: \"{location_text}\" bei Koordinaten {latitude:.5}, {longitude:.5}. Wie lautet die Postleitzahl?"
        );
        let ask = self.race.ask(CORRECT_PLZ_SYSTEM_PROMPT, &user_prompt);
        match tokio::time::timeout(CORRECT_PLZ_TIMEOUT, ask).await {
            Ok((raw, _)) => validate_plz_answer(&raw),
            Err(_) => {
                tracing::warn!("plz correction timed out");
                None
            }
        }
    }
}

fn cache_input(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split an answer on `->`, at most `maxsplit` times, trimming each part.
pub fn parse_arrow_response(raw: &str, maxsplit: usize) -> Vec<String> {
    raw.splitn(maxsplit + 1, "->")
        .map(|part| part.trim().to_string())
        .collect()
}

pub fn parse_yes_no(raw: &str) -> YesNo {
    let parts = parse_arrow_response(raw, 1);
    let (reasoning, decision) = if parts.len() == 2 {
        (parts[0].clone(), parts[1].clone())
    } else {
        ("Keine Begründung gegeben.".to_string(), parts[0].clone())
    };
    YesNo {
        is_agreement: decision.eq_ignore_ascii_case("ja"),
        reasoning,
    }
}

pub fn parse_classification(raw: &str) -> Classification {
    let parts = parse_arrow_response(raw, 1);
    let (reasoning, class) = if parts.len() == 2 {
        (parts[0].clone(), parts[1].clone())
    } else {
        ("Keine Begründung gegeben.".to_string(), parts[0].clone())
    };

    let intent = Intent::parse(&class);
    let normalized = class.trim().to_lowercase();
    let reasoning = if intent == Intent::Andere && normalized != "andere" {
        format!(
            "Unerwartete Klassifizierung '{normalized}', fallback zu 'andere'. Ursprüngliche Begründung: {reasoning}"
        )
    } else {
        reasoning
    };

    Classification {
        intent_str: intent.as_str().to_string(),
        reasoning,
    }
}

pub fn parse_location_extraction(raw: &str) -> LocationExtraction {
    let parts = parse_arrow_response(raw, 3);
    if parts.len() < 4 {
        return LocationExtraction::default();
    }
    let flag = |part: &str| part.eq_ignore_ascii_case("ja");
    LocationExtraction {
        contains_location: flag(&parts[0]),
        contains_city: flag(&parts[1]),
        knows_location: flag(&parts[2]),
        address: Some(parts[3].clone()).filter(|a| !a.is_empty()),
    }
}

/// Accept only a bare 4-or-5-digit postal code.
pub fn validate_plz_answer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if (4..=5).contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const YES_NO_SYSTEM_PROMPT: &str = r#"
Du entscheidest: zeigt die Antwort eine Zustimmung? Gib eine kurze Begründung und "Ja" oder "Nein" aus.

FORMAT: <Begründung> -> <Ja/Nein>
Gebe die Antwort und Begründung ohne < und > aus. Die Begründung soll kurz sein (max 10 Wörter).

JA falls klare oder schwache Zustimmung / Bestätigung, inkl.:
- Varianten & Umgangssprache: ja, jup, jo, genau, absolut, stimmt, passt, in ordnung, alles klar, na gut, machen wir so.
- Eingeleitete Zustimmung mit Nachsatz: "Stimmt, aber..." -> Ja.
- Verballhornte ASR-Fehler: schwimmt (für "stimmt") -> Ja, Jagd (für "ja") wenn Kontext zustimmend.

NEIN falls:
- Explizite Negation: nein, keineswegs, ganz und gar nicht.
- Bitte um Wiederholung / Unklarheit: "bitte wiederholen", "weiß nicht", "egal".
- Verneinende Konstruktionen: "stimmt nicht", "nicht richtig".
- Frage zurück ohne Zustimmung.

Ambig ohne positives Signal -> Nein. Sonst Ja.
"#;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"
Du klassifizierst exakt in eine dieser Klassen: 'schlüsseldienst', 'abschleppdienst', 'adac', 'mitarbeiter', 'andere'.

FORMAT: <Begründung> -> <Klassenname>
Gebe die Klasse und Begründung ohne < und > aus. Begründung kurz auf Deutsch, max 10 Wörter.

REGELN (kurz & strikt):
1. abschleppdienst:
   1.1 Alle KFZ-/Pannen-/Fahrzeugprobleme.
   1.2 Varianten: Motor, Wagen, Batterie leer, Reifen kaputt, kein Benzin, abschleppen, Panne, Rauch, brennt.
2. schlüsseldienst:
   2.1 Haus / Wohnung / Tür, Schloss zu.
   2.2 Schlüssel verloren/abgebrochen/steckt von innen im Auto.
   2.3 Alles rund ums Auto wenn der Schlüssel betroffen ist.
   2.4 "Türen sind zu" ohne klaren Auto-Kontext -> schlüsseldienst.
3. adac:
   3.1 Erwähnungen/Varianten: adac, a d a c, a d c.
4. mitarbeiter:
   4.1 Wunsch nach Mensch / Mitarbeiter / Agent / realer Person / durchstellen / verbinden.
   4.2 Auch verschrieben (mit Arbeiter).
5. andere:
   5.1 Alles Administrative (Kündigung, Kostenfrage).
   5.2 Unklare generische Hilfe ("Brauche Hilfe").
   5.3 Irrelevantes oder zu Vages ohne klare Zuordnung.

PRIORITÄTEN BEI AMBIGUITÄT:
1. Sowohl Schlüssel- als auch Auto-Kontext: entscheide immer für schlüsseldienst.
2. Klarer Wunsch nach Mensch überschreibt andere Hinweise -> mitarbeiter.
3. Sonst fallback 'andere'.
"#;

const PROCESS_LOCATION_SYSTEM_PROMPT: &str = r#"
Analysiere den gesprochenen Text auf Adressinformationen. Beantworte vier Fragen:
1. Enthält der Text eine Ortsangabe (Straße, PLZ oder Ort)? (Ja/Nein)
2. Enthält der Text einen Ortsnamen oder eine PLZ? (Ja/Nein)
3. Kennt der Sprecher seine Adresse? (Ja/Nein; "Ich weiß nicht wo ich bin" -> Nein)
4. Der extrahierte Adressteil, Format "Straße Hausnummer in PLZ Ort" oder verfügbare Teile davon; leer falls keine Adresse.

FORMAT: <Ja/Nein> -> <Ja/Nein> -> <Ja/Nein> -> <Adresse>
Gebe die Antwort ohne < und > aus.

BEISPIELE:
"Ich wohne in der Güterstraße 12 in 94469 Deggendorf" -> Ja -> Ja -> Ja -> Güterstraße 12 in 94469 Deggendorf
"Kannst du zu mir kommen? Ich bin krank." -> Nein -> Nein -> Ja ->
"Ich weiß nicht wo ich bin." -> Nein -> Nein -> Nein ->
"7 9 5 9 2" -> Ja -> Ja -> Ja -> 79592
"Osterhofen" -> Ja -> Ja -> Ja -> Osterhofen
"#;

const CORRECT_PLZ_SYSTEM_PROMPT: &str = r#"
Du bist Experte für deutsche und österreichische Postleitzahlen. Antworte NUR mit der Postleitzahl des genannten Ortes (4 oder 5 Ziffern), ohne weiteren Text. Wenn du die Postleitzahl nicht sicher kennst, antworte mit nichts.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CompletionProvider;
    use crate::race::LlmRace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Arrow parser ─────────────────────────────────────────────

    #[test]
    fn arrow_single_split() {
        assert_eq!(
            parse_arrow_response("Begründung -> Ja", 1),
            vec!["Begründung", "Ja"]
        );
    }

    #[test]
    fn arrow_no_arrow_returns_single_element() {
        assert_eq!(
            parse_arrow_response("Just a plain response", 1),
            vec!["Just a plain response"]
        );
    }

    #[test]
    fn arrow_strips_whitespace() {
        assert_eq!(
            parse_arrow_response("  lots of space   ->   also here  ", 1),
            vec!["lots of space", "also here"]
        );
    }

    #[test]
    fn arrow_maxsplit_limits_splits() {
        assert_eq!(
            parse_arrow_response("a -> b -> c -> d", 3),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(
            parse_arrow_response("first -> second -> third", 1),
            vec!["first", "second -> third"]
        );
    }

    #[test]
    fn arrow_only_yields_two_empty_strings() {
        assert_eq!(parse_arrow_response("->", 1), vec!["", ""]);
    }

    #[test]
    fn arrow_empty_input() {
        assert_eq!(parse_arrow_response("", 1), vec![""]);
        assert_eq!(parse_arrow_response("   ", 1), vec![""]);
    }

    // ── Yes/no parser ────────────────────────────────────────────

    #[test]
    fn yes_no_agreement() {
        let parsed = parse_yes_no("Klar ja. -> Ja");
        assert!(parsed.is_agreement);
        assert_eq!(parsed.reasoning, "Klar ja.");
    }

    #[test]
    fn yes_no_disagreement() {
        let parsed = parse_yes_no("Klar nein. -> Nein");
        assert!(!parsed.is_agreement);
        assert_eq!(parsed.reasoning, "Klar nein.");
    }

    #[test]
    fn yes_no_without_arrow_uses_raw_as_decision() {
        let parsed = parse_yes_no("Ja");
        assert!(parsed.is_agreement);
        assert_eq!(parsed.reasoning, "Keine Begründung gegeben.");
    }

    #[test]
    fn yes_no_arrow_only_is_disagreement() {
        let parsed = parse_yes_no("->");
        assert!(!parsed.is_agreement);
        assert_eq!(parsed.reasoning, "");
    }

    #[test]
    fn yes_no_decision_case_insensitive() {
        assert!(parse_yes_no("gut -> JA").is_agreement);
        assert!(!parse_yes_no("gut -> NEIN").is_agreement);
    }

    // ── Classification parser ────────────────────────────────────

    #[test]
    fn classification_known_class() {
        let parsed = parse_classification("Auto-Panne erkannt -> abschleppdienst");
        assert_eq!(parsed.intent(), Intent::Abschleppdienst);
        assert_eq!(parsed.reasoning, "Auto-Panne erkannt");
    }

    #[test]
    fn classification_unknown_class_falls_back() {
        let parsed = parse_classification("Irgendwas -> pizza");
        assert_eq!(parsed.intent(), Intent::Andere);
        assert!(parsed.reasoning.contains("fallback zu 'andere'"));
    }

    // ── Location parser ──────────────────────────────────────────

    #[test]
    fn location_full_address() {
        let parsed =
            parse_location_extraction("Ja -> Ja -> Ja -> Hauptstraße 5 in Immenstadt");
        assert!(parsed.contains_location);
        assert!(parsed.contains_city);
        assert!(parsed.knows_location);
        assert_eq!(parsed.address.as_deref(), Some("Hauptstraße 5 in Immenstadt"));
    }

    #[test]
    fn location_no_address_found() {
        let parsed = parse_location_extraction("Nein -> Nein -> Ja ->");
        assert!(!parsed.contains_location);
        assert!(!parsed.contains_city);
        assert!(parsed.knows_location);
        assert_eq!(parsed.address, None);
    }

    #[test]
    fn location_caller_does_not_know() {
        let parsed = parse_location_extraction("Nein -> Nein -> Nein ->");
        assert!(!parsed.knows_location);
        assert_eq!(parsed.address, None);
    }

    #[test]
    fn location_malformed_response_defaults_to_all_false() {
        let parsed = parse_location_extraction("Some unexpected text");
        assert_eq!(parsed, LocationExtraction::default());
    }

    // ── PLZ validation ───────────────────────────────────────────

    #[test]
    fn plz_answer_validation() {
        assert_eq!(validate_plz_answer("4020"), Some("4020".to_string()));
        assert_eq!(validate_plz_answer("80331"), Some("80331".to_string()));
        assert_eq!(validate_plz_answer("  4020  "), Some("4020".to_string()));
        assert_eq!(validate_plz_answer("Die PLZ ist 4020"), None);
        assert_eq!(validate_plz_answer("123"), None);
        assert_eq!(validate_plz_answer("123456"), None);
        assert_eq!(validate_plz_answer(""), None);
    }

    // ── cached_request behavior ──────────────────────────────────

    struct ScriptedProvider {
        tag: &'static str,
        answer: String,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _system: &str, _user: &str) -> nd_domain::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }

        fn tag(&self) -> &'static str {
            self.tag
        }
    }

    fn orchestrator_answering(answer: &str, dir: &std::path::Path) -> LlmOrchestrator {
        let primary = Arc::new(ScriptedProvider {
            tag: "grok",
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(ScriptedProvider {
            tag: "gpt",
            answer: String::new(),
            calls: AtomicUsize::new(0),
        });
        LlmOrchestrator::new(
            LlmRace::new(primary, secondary),
            Arc::new(JsonCache::open(dir)),
        )
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_answering("Klar ja. -> Ja", dir.path());

        let first = orchestrator.yes_no_question("ja", "ctx").await.unwrap();
        assert!(first.value.is_agreement);
        assert_eq!(first.source, "grok");

        let second = orchestrator.yes_no_question("ja", "ctx").await.unwrap();
        assert_eq!(second.value, first.value);
        assert_eq!(second.source, "cache");
        assert_eq!(second.duration, 0.0);
    }

    #[tokio::test]
    async fn mitarbeiter_token_raises_human_requested() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_answering("MITARBEITER", dir.path());

        let result = orchestrator
            .yes_no_question("Ich möchte einen Menschen sprechen", "ctx")
            .await;
        assert!(matches!(result, Err(Error::HumanRequested)));

        // Nothing was cached for the aborted request.
        let retry = orchestrator
            .yes_no_question("Ich möchte einen Menschen sprechen", "ctx")
            .await;
        assert!(matches!(retry, Err(Error::HumanRequested)));
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_cache_write() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_answering("unused", dir.path());

        let answer = orchestrator.yes_no_question("", "ctx").await.unwrap();
        assert!(!answer.value.is_agreement);
        assert_eq!(answer.value.reasoning, "Kein Text vorhanden.");
        assert_eq!(answer.source, "cache");
        assert_eq!(answer.duration, 0.0);

        let extraction = orchestrator.process_location("").await.unwrap();
        assert_eq!(extraction.value, LocationExtraction::default());

        let classification = orchestrator.classify_intent("  ").await.unwrap();
        assert_eq!(classification.value.intent(), Intent::Andere);
    }

    #[tokio::test]
    async fn correct_plz_discards_prose_answers() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_answering("Die PLZ ist 4020", dir.path());
        assert_eq!(orchestrator.correct_plz("Linz", 48.3, 14.3).await, None);

        let orchestrator = orchestrator_answering("4020", dir.path());
        assert_eq!(
            orchestrator.correct_plz("Linz", 48.3, 14.3).await,
            Some("4020".to_string())
        );
        assert_eq!(orchestrator.correct_plz("", 48.3, 14.3).await, None);
    }
}
