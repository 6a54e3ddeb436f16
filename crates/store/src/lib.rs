//! Redis-backed state for the voice agent.
//!
//! Four stores share one connection manager: the per-call store
//! ([`CallStore`]), recording artifacts ([`RecordingStore`]), location-share
//! links ([`LinkStore`]), and the per-service settings store
//! ([`SettingsStore`]). All of them are cheap to clone.

pub mod call_store;
pub mod keys;
pub mod links;
pub mod recordings;
pub mod settings_store;

pub use call_store::{CallStore, QueueEntry};
pub use links::{LinkRecord, LinkStore, NewLink};
pub use recordings::{RecordingMetadata, RecordingStore, RecordingType};
pub use settings_store::SettingsStore;

use nd_domain::{Error, Result};

pub(crate) fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

/// Connect to Redis and hand out the shared connection manager.
pub async fn connect(redis_url: &str) -> Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(redis_url).map_err(store_err)?;
    let manager = client.get_connection_manager().await.map_err(store_err)?;
    tracing::info!(url = %redis_url, "state store connected");
    Ok(manager)
}
