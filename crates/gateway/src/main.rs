use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use nd_domain::config::{Config, ConfigSeverity};
use nd_gateway::api;
use nd_gateway::speech::SpeechClient;
use nd_gateway::state::AppState;
use nd_gateway::twilio::TwilioClient;
use nd_llm::{BytesCache, ChatCompletionsProvider, JsonCache, LlmOrchestrator, LlmRace};
use nd_store::{CallStore, LinkStore, RecordingStore, SettingsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env().context("reading configuration")?);

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    tracing::info!("notdienst-agent starting");

    // ── State store ──────────────────────────────────────────────────
    let redis = nd_store::connect(&config.redis_url)
        .await
        .context("connecting to the state store")?;
    let calls = CallStore::new(redis.clone());
    let recordings = RecordingStore::new(redis.clone());
    let links = LinkStore::new(redis.clone());
    let settings = SettingsStore::new(redis);

    // ── LLM orchestrator ─────────────────────────────────────────────
    let grok = Arc::new(
        ChatCompletionsProvider::xai(&config.xai_api_key, &config.xai_model)
            .context("initializing the xAI provider")?,
    );
    let gpt = Arc::new(
        ChatCompletionsProvider::baseten(
            &config.baseten_base_url,
            &config.baseten_api_key,
            &config.baseten_model,
        )
        .context("initializing the Baseten provider")?,
    );
    let llm_cache = Arc::new(JsonCache::open(&config.cache_root));
    let llm = Arc::new(LlmOrchestrator::new(LlmRace::new(grok, gpt), llm_cache));
    tracing::info!("llm orchestrator ready");

    // ── Geo clients ──────────────────────────────────────────────────
    let geocoder = Arc::new(
        nd_geo::GeocodeClient::new(&config.maps_api_key).context("initializing geocoding")?,
    );
    let routes = Arc::new(
        nd_geo::RoutesClient::new(&config.routes_api_key).context("initializing routing")?,
    );
    tracing::info!("geo clients ready");

    // ── Vendor bindings ──────────────────────────────────────────────
    let twilio = Arc::new(TwilioClient::new(&config).context("initializing telephony")?);
    let speech = Arc::new(SpeechClient::new(&config).context("initializing speech-to-text")?);
    let audio_cache = Arc::new(BytesCache::open(&config.cache_root));
    tracing::info!("vendor bindings ready");

    let state = AppState {
        config: config.clone(),
        calls,
        recordings,
        links,
        settings,
        llm,
        geocoder,
        routes,
        twilio,
        speech,
        audio_cache,
        http: reqwest::Client::new(),
    };

    // ── Router + bind ────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "notdienst-agent listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nd_gateway=debug")),
        )
        .init();
}
