//! LLM orchestration: provider adapters, the two-provider race, persistent
//! result caches, and the conversational primitives the call flow uses
//! (yes/no, intent classification, address extraction, PLZ correction).

pub mod cache;
pub mod orchestrator;
pub mod providers;
pub mod race;

pub use cache::{derive_cache_key, BytesCache, JsonCache};
pub use orchestrator::{
    Answer, Classification, LlmOrchestrator, LocationExtraction, YesNo,
};
pub use providers::{ChatCompletionsProvider, CompletionProvider};
pub use race::LlmRace;
