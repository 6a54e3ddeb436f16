//! The two-provider race.
//!
//! Provider A gets a one-second head start; a non-empty answer inside that
//! window wins outright. Otherwise both race to the first non-empty result.
//! The loser is aborted, which drops its in-flight HTTP future and releases
//! the socket. Provider errors count as empty answers and never fail the
//! other side.

use std::sync::Arc;
use std::time::Duration;

use crate::providers::CompletionProvider;

/// How long provider A may answer alone before B's result is considered.
const HEAD_START: Duration = Duration::from_secs(1);

/// Tag returned when neither provider produced text.
pub const SOURCE_UNKNOWN: &str = "unknown";

pub struct LlmRace {
    primary: Arc<dyn CompletionProvider>,
    secondary: Arc<dyn CompletionProvider>,
}

impl LlmRace {
    pub fn new(
        primary: Arc<dyn CompletionProvider>,
        secondary: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Ask both providers; return the first non-empty answer and its tag,
    /// or `("", "unknown")` when both come back empty.
    pub async fn ask(&self, system_prompt: &str, user_prompt: &str) -> (String, &'static str) {
        let primary_tag = self.primary.tag();
        let secondary_tag = self.secondary.tag();

        let mut primary = spawn_completion(self.primary.clone(), system_prompt, user_prompt);
        let mut secondary = spawn_completion(self.secondary.clone(), system_prompt, user_prompt);

        let mut primary_done = false;
        let mut secondary_done = false;

        // Head start: a fast non-empty primary answer short-circuits.
        if let Ok(result) = tokio::time::timeout(HEAD_START, &mut primary).await {
            primary_done = true;
            if let Some(text) = non_empty(result) {
                secondary.abort();
                return (text, primary_tag);
            }
        }

        loop {
            if primary_done && secondary_done {
                return (String::new(), SOURCE_UNKNOWN);
            }
            tokio::select! {
                result = &mut primary, if !primary_done => {
                    primary_done = true;
                    if let Some(text) = non_empty(result) {
                        secondary.abort();
                        return (text, primary_tag);
                    }
                }
                result = &mut secondary, if !secondary_done => {
                    secondary_done = true;
                    if let Some(text) = non_empty(result) {
                        primary.abort();
                        return (text, secondary_tag);
                    }
                }
            }
        }
    }
}

fn spawn_completion(
    provider: Arc<dyn CompletionProvider>,
    system_prompt: &str,
    user_prompt: &str,
) -> tokio::task::JoinHandle<String> {
    let tag = provider.tag();
    let system_prompt = system_prompt.to_string();
    let user_prompt = user_prompt.to_string();
    tokio::spawn(async move {
        match provider.complete(&system_prompt, &user_prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(provider = tag, error = %e, "provider call failed");
                String::new()
            }
        }
    })
}

fn non_empty(result: std::result::Result<String, tokio::task::JoinError>) -> Option<String> {
    match result {
        Ok(text) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_domain::{Error, Result};

    struct FakeProvider {
        tag: &'static str,
        delay: Duration,
        answer: Result<String>,
    }

    impl FakeProvider {
        fn answering(tag: &'static str, delay_ms: u64, answer: &str) -> Arc<Self> {
            Arc::new(Self {
                tag,
                delay: Duration::from_millis(delay_ms),
                answer: Ok(answer.to_string()),
            })
        }

        fn failing(tag: &'static str, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                tag,
                delay: Duration::from_millis(delay_ms),
                answer: Err(Error::Http("boom".into())),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionProvider for FakeProvider {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(Error::Http("boom".into())),
            }
        }

        fn tag(&self) -> &'static str {
            self.tag
        }
    }

    #[tokio::test(start_paused = true)]
    async fn primary_wins_within_head_start() {
        let race = LlmRace::new(
            FakeProvider::answering("grok", 300, "grok answer"),
            FakeProvider::answering("gpt", 100, "gpt answer"),
        );
        let (text, source) = race.ask("system", "user").await;
        assert_eq!(text, "grok answer");
        assert_eq!(source, "grok");
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_wins_when_primary_is_slow() {
        let race = LlmRace::new(
            FakeProvider::answering("grok", 5_000, ""),
            FakeProvider::answering("gpt", 200, "gpt answer"),
        );
        let (text, source) = race.ask("system", "user").await;
        assert_eq!(text, "gpt answer");
        assert_eq!(source, "gpt");
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_wins_when_primary_errors() {
        let race = LlmRace::new(
            FakeProvider::failing("grok", 100),
            FakeProvider::answering("gpt", 2_000, "gpt answer"),
        );
        let (text, source) = race.ask("system", "user").await;
        assert_eq!(text, "gpt answer");
        assert_eq!(source, "gpt");
    }

    #[tokio::test(start_paused = true)]
    async fn both_empty_returns_unknown() {
        let race = LlmRace::new(
            FakeProvider::answering("grok", 100, ""),
            FakeProvider::answering("gpt", 100, "   "),
        );
        let (text, source) = race.ask("system", "user").await;
        assert_eq!(text, "");
        assert_eq!(source, SOURCE_UNKNOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_empty_inside_head_start_falls_back() {
        let race = LlmRace::new(
            FakeProvider::answering("grok", 50, ""),
            FakeProvider::answering("gpt", 3_000, "late gpt"),
        );
        let (text, source) = race.ask("system", "user").await;
        assert_eq!(text, "late gpt");
        assert_eq!(source, "gpt");
    }
}
