//! Location-share links.
//!
//! Each link is a one-shot token: generated with a server-side atomic
//! counter, valid for 24 hours, consumed by the first location POST.

use chrono::{Duration, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use nd_domain::Result;

use crate::keys::{self, TTL_PERSISTENT};
use crate::store_err;

/// Stored link state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub used_at: Option<String>,
    pub phone_number: String,
}

/// Result of generating a fresh link.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub link_id: i64,
    pub expires_at: String,
}

#[derive(Clone)]
pub struct LinkStore {
    con: redis::aio::ConnectionManager,
}

impl LinkStore {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    /// Allocate the next link id (server-side `INCR`, never computed
    /// client-side) and store the link record with a 24 h TTL.
    pub async fn generate(&self, phone_number: &str) -> Result<NewLink> {
        let mut con = self.con.clone();
        let link_id: i64 = con
            .incr(keys::LINK_COUNTER_KEY, 1)
            .await
            .map_err(store_err)?;

        let now = Utc::now();
        let expires_at = (now + Duration::hours(24)).to_rfc3339();
        let record = LinkRecord {
            status: "generated".into(),
            created_at: now.to_rfc3339(),
            expires_at: expires_at.clone(),
            used: false,
            used_at: None,
            phone_number: phone_number.to_string(),
        };

        con.set_ex::<_, _, ()>(
            keys::link_key(link_id),
            serde_json::to_string(&record)?,
            TTL_PERSISTENT,
        )
        .await
        .map_err(store_err)?;

        tracing::info!(link_id, phone = phone_number, "location link generated");
        Ok(NewLink {
            link_id,
            expires_at,
        })
    }

    pub async fn get(&self, link_id: i64) -> Result<Option<LinkRecord>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(keys::link_key(link_id)).await.map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }

    /// Mark a link consumed. `used` is terminal; callers must have checked
    /// it before this point and reject a second POST as gone.
    pub async fn mark_used(&self, link_id: i64, mut record: LinkRecord) -> Result<()> {
        record.used = true;
        record.used_at = Some(Utc::now().to_rfc3339());
        record.status = "used".into();
        let mut con = self.con.clone();
        con.set_ex::<_, _, ()>(
            keys::link_key(link_id),
            serde_json::to_string(&record)?,
            TTL_PERSISTENT,
        )
        .await
        .map_err(store_err)
    }
}
