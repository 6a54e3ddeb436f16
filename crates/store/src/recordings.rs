//! Recording artifacts: raw media bytes plus metadata, keyed by
//! `(encoded phone, call timestamp, recording type)` and kept for a day.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use nd_domain::Result;

use crate::keys::{self, TTL_PERSISTENT};
use crate::store_err;

/// Which call segment a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingType {
    Initial,
    Followup,
}

impl RecordingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingType::Initial => "initial",
            RecordingType::Followup => "followup",
        }
    }

    /// Lenient parse: unknown or missing sources default to `initial`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_lowercase()).as_deref() {
            Some("followup") => RecordingType::Followup,
            _ => RecordingType::Initial,
        }
    }
}

/// Metadata stored next to the media bytes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordingMetadata {
    pub recording_sid: Option<String>,
    pub recording_type: String,
    pub bytes_total: usize,
    pub segment_duration_seconds: Option<u32>,
    pub call_timestamp: Option<String>,
}

#[derive(Clone)]
pub struct RecordingStore {
    con: redis::aio::ConnectionManager,
}

impl RecordingStore {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    /// Store a recording. Empty payloads and anonymous callers are dropped
    /// silently.
    pub async fn save(
        &self,
        caller: &str,
        timestamp: &str,
        recording_type: RecordingType,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: &RecordingMetadata,
    ) -> Result<()> {
        if bytes.is_empty() || caller.eq_ignore_ascii_case("anonymous") {
            tracing::debug!(caller, "recording skipped (empty or anonymous)");
            return Ok(());
        }

        let key = keys::recording_key(
            &keys::encode_phone(caller),
            timestamp,
            recording_type.as_str(),
        );
        let metadata_json = serde_json::to_string(metadata)?;
        let bytes_total = bytes.len();

        let mut con = self.con.clone();
        redis::pipe()
            .atomic()
            .hset(&key, "data", bytes)
            .ignore()
            .hset(&key, "content_type", content_type)
            .ignore()
            .hset(&key, "metadata", metadata_json)
            .ignore()
            .expire(&key, TTL_PERSISTENT as i64)
            .ignore()
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(store_err)?;

        tracing::info!(
            caller,
            timestamp,
            recording_type = recording_type.as_str(),
            bytes = bytes_total,
            content_type,
            "recording stored"
        );
        Ok(())
    }

    /// Fetch media bytes and content type by the `00`-encoded phone number
    /// used in recording URLs.
    pub async fn get(
        &self,
        encoded_phone: &str,
        timestamp: &str,
        recording_type: RecordingType,
    ) -> Result<Option<(Vec<u8>, String)>> {
        let key = keys::recording_key(encoded_phone, timestamp, recording_type.as_str());
        let mut con = self.con.clone();
        let bytes: Option<Vec<u8>> = con.hget(&key, "data").await.map_err(store_err)?;
        let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
            return Ok(None);
        };
        let content_type: Option<String> =
            con.hget(&key, "content_type").await.map_err(store_err)?;
        Ok(Some((
            bytes,
            content_type.unwrap_or_else(|| "audio/mpeg".to_string()),
        )))
    }

    pub async fn get_metadata(
        &self,
        encoded_phone: &str,
        timestamp: &str,
        recording_type: RecordingType,
    ) -> Result<Option<RecordingMetadata>> {
        let key = keys::recording_key(encoded_phone, timestamp, recording_type.as_str());
        let mut con = self.con.clone();
        let raw: Option<String> = con.hget(&key, "metadata").await.map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_type_parse_is_lenient() {
        assert_eq!(RecordingType::parse(None), RecordingType::Initial);
        assert_eq!(RecordingType::parse(Some("")), RecordingType::Initial);
        assert_eq!(RecordingType::parse(Some("initial")), RecordingType::Initial);
        assert_eq!(
            RecordingType::parse(Some("followup")),
            RecordingType::Followup
        );
        assert_eq!(
            RecordingType::parse(Some("  Followup  ")),
            RecordingType::Followup
        );
        assert_eq!(
            RecordingType::parse(Some("whatever")),
            RecordingType::Initial
        );
    }
}
