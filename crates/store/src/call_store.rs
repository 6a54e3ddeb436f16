//! Per-call state: lifecycle, job info, transcript, location, transfer
//! queue.
//!
//! The telephony provider serializes webhooks within one call, so no
//! intra-call locking is needed; single-key Redis atomicity covers
//! everything here.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use nd_domain::{Location, Message, Result, Role};

use crate::keys::{self, TTL_PERSISTENT, TTL_TRANSIENT};
use crate::store_err;

/// One entry of the per-call dial queue. Head is the next transfer target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub name: String,
    pub phone: String,
}

/// Call-scoped reads and writes under `callers:{E164}:…`.
#[derive(Clone)]
pub struct CallStore {
    con: redis::aio::ConnectionManager,
}

impl CallStore {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Create the call root: service, Berlin-local start timestamp, live
    /// flag, and a primed empty transcript. Atomic so a half-initialized
    /// call can never be observed.
    pub async fn init_new_call(&self, caller: &str, service: &str) -> Result<String> {
        let timestamp = keys::call_timestamp_now();
        let mut con = self.con.clone();
        redis::pipe()
            .atomic()
            .set_ex(keys::caller_key(caller, "service"), service, TTL_TRANSIENT)
            .ignore()
            .set_ex(
                keys::caller_key(caller, "start_time"),
                &timestamp,
                TTL_TRANSIENT,
            )
            .ignore()
            .set_ex(keys::job_key(caller, "Live"), "Ja", TTL_TRANSIENT)
            .ignore()
            .set_ex(keys::caller_key(caller, "messages"), "[]", TTL_PERSISTENT)
            .ignore()
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(store_err)?;
        tracing::info!(caller, service, %timestamp, "call initialized");
        Ok(timestamp)
    }

    /// Delete the transient call keys. Messages, recordings and the
    /// transferred-to marker survive for repeat-call context.
    pub async fn cleanup_call(&self, caller: &str) -> Result<()> {
        let mut con = self.con.clone();
        let job_keys: Vec<String> = {
            let pattern = keys::job_key(caller, "*");
            let mut iter = con
                .scan_match::<String, String>(pattern)
                .await
                .map_err(store_err)?;
            let mut found = Vec::new();
            while let Some(key) = iter.next_item().await {
                found.push(key);
            }
            found
        };

        let mut to_delete = vec![
            keys::caller_key(caller, "service"),
            keys::caller_key(caller, "start_time"),
            keys::caller_key(caller, "location"),
            keys::caller_key(caller, "queue"),
            keys::caller_key(caller, "transcription"),
        ];
        to_delete.extend(job_keys);

        con.del::<_, ()>(to_delete).await.map_err(store_err)?;
        tracing::debug!(caller, "transient call state cleaned up");
        Ok(())
    }

    pub async fn get_service(&self, caller: &str) -> Result<Option<String>> {
        let mut con = self.con.clone();
        con.get(keys::caller_key(caller, "service"))
            .await
            .map_err(store_err)
    }

    pub async fn get_call_timestamp(&self, caller: &str) -> Result<Option<String>> {
        let mut con = self.con.clone();
        con.get(keys::caller_key(caller, "start_time"))
            .await
            .map_err(store_err)
    }

    // ── Job info ─────────────────────────────────────────────────

    pub async fn save_job_info(&self, caller: &str, field: &str, value: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.set_ex(keys::job_key(caller, field), value, TTL_TRANSIENT)
            .await
            .map_err(store_err)
    }

    pub async fn get_job_info(&self, caller: &str, field: &str) -> Result<Option<String>> {
        let mut con = self.con.clone();
        let value: Option<String> = con
            .get(keys::job_key(caller, field))
            .await
            .map_err(store_err)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    pub async fn delete_job_info(&self, caller: &str, field: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.del(keys::job_key(caller, field)).await.map_err(store_err)
    }

    // ── Transcript ───────────────────────────────────────────────

    /// Append one transcript line. Read-modify-write is fine here: the
    /// provider serializes webhooks within a call.
    pub async fn append_message(&self, caller: &str, message: Message) -> Result<()> {
        let key = keys::caller_key(caller, "messages");
        let mut con = self.con.clone();
        let existing: Option<String> = con.get(&key).await.map_err(store_err)?;
        let mut messages: Vec<Message> = existing
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        messages.push(message);
        let encoded = serde_json::to_string(&messages)?;
        con.set_ex(&key, encoded, TTL_PERSISTENT)
            .await
            .map_err(store_err)
    }

    pub async fn get_messages(&self, caller: &str) -> Result<Vec<Message>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .get(keys::caller_key(caller, "messages"))
            .await
            .map_err(store_err)?;
        Ok(raw
            .as_deref()
            .and_then(|r| serde_json::from_str(r).ok())
            .unwrap_or_default())
    }

    pub async fn agent_message(&self, caller: &str, content: &str) -> Result<()> {
        tracing::info!(caller, "agent: {content}");
        self.append_message(caller, Message::new(Role::Agent, content))
            .await
    }

    pub async fn user_message(&self, caller: &str, content: &str) -> Result<()> {
        tracing::info!(caller, "user: {content}");
        self.append_message(caller, Message::new(Role::User, content))
            .await
    }

    pub async fn ai_message(
        &self,
        caller: &str,
        content: &str,
        duration: Option<f64>,
        model_source: Option<&str>,
    ) -> Result<()> {
        tracing::info!(caller, source = model_source.unwrap_or("-"), "ai: {content}");
        self.append_message(
            caller,
            Message::timed(Role::Ai, content, duration, model_source.map(String::from)),
        )
        .await
    }

    pub async fn google_message(
        &self,
        caller: &str,
        content: &str,
        duration: Option<f64>,
    ) -> Result<()> {
        tracing::info!(caller, "google: {content}");
        self.append_message(caller, Message::timed(Role::Google, content, duration, None))
            .await
    }

    pub async fn twilio_message(&self, caller: &str, content: &str) -> Result<()> {
        tracing::info!(caller, "twilio: {content}");
        self.append_message(caller, Message::new(Role::Twilio, content))
            .await
    }

    // ── Location ─────────────────────────────────────────────────

    pub async fn save_location(&self, caller: &str, location: &Location) -> Result<()> {
        let mut con = self.con.clone();
        let encoded = serde_json::to_string(location)?;
        con.set_ex(keys::caller_key(caller, "location"), encoded, TTL_TRANSIENT)
            .await
            .map_err(store_err)
    }

    pub async fn get_location(&self, caller: &str) -> Result<Option<Location>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .get(keys::caller_key(caller, "location"))
            .await
            .map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }

    /// Location received through the SMS share link. Kept for a day so the
    /// outbound callback can pick it up even if the caller is slow.
    pub async fn save_shared_location(&self, caller: &str, location: &Location) -> Result<()> {
        let mut con = self.con.clone();
        let encoded = serde_json::to_string(location)?;
        con.set_ex(
            keys::caller_key(caller, "shared_location"),
            encoded,
            TTL_PERSISTENT,
        )
        .await
        .map_err(store_err)
    }

    pub async fn get_shared_location(&self, caller: &str) -> Result<Option<Location>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .get(keys::caller_key(caller, "shared_location"))
            .await
            .map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }

    // ── Transcription ────────────────────────────────────────────

    pub async fn set_transcription_text(&self, caller: &str, text: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.set_ex(keys::caller_key(caller, "transcription"), text, TTL_TRANSIENT)
            .await
            .map_err(store_err)
    }

    pub async fn get_transcription_text(&self, caller: &str) -> Result<Option<String>> {
        let mut con = self.con.clone();
        let text: Option<String> = con
            .get(keys::caller_key(caller, "transcription"))
            .await
            .map_err(store_err)?;
        Ok(text.filter(|t| !t.is_empty()))
    }

    // ── Transfer queue ───────────────────────────────────────────

    pub async fn add_to_caller_queue(&self, caller: &str, name: &str, phone: &str) -> Result<()> {
        let key = keys::caller_key(caller, "queue");
        let entry = serde_json::to_string(&QueueEntry {
            name: name.to_string(),
            phone: phone.to_string(),
        })?;
        let mut con = self.con.clone();
        con.rpush::<_, _, ()>(&key, entry).await.map_err(store_err)?;
        con.expire::<_, ()>(&key, TTL_TRANSIENT as i64)
            .await
            .map_err(store_err)
    }

    /// Peek the head of the queue without removing it.
    pub async fn get_next_caller_in_queue(&self, caller: &str) -> Result<Option<QueueEntry>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .lindex(keys::caller_key(caller, "queue"), 0)
            .await
            .map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }

    /// Drop the head after a failed dial attempt.
    pub async fn delete_next_caller(&self, caller: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.lpop::<_, ()>(keys::caller_key(caller, "queue"), None)
            .await
            .map_err(store_err)
    }

    pub async fn clear_caller_queue(&self, caller: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.del(keys::caller_key(caller, "queue"))
            .await
            .map_err(store_err)
    }

    pub async fn queue_length(&self, caller: &str) -> Result<usize> {
        let mut con = self.con.clone();
        con.llen(keys::caller_key(caller, "queue"))
            .await
            .map_err(store_err)
    }

    // ── Transferred-to ───────────────────────────────────────────

    /// Remember the contact who accepted the transfer; repeat calls from
    /// the same number go straight back to them.
    pub async fn set_transferred_to(&self, caller: &str, phone: &str, name: &str) -> Result<()> {
        let mut con = self.con.clone();
        let encoded = serde_json::to_string(&QueueEntry {
            name: name.to_string(),
            phone: phone.to_string(),
        })?;
        con.set_ex(
            keys::caller_key(caller, "transferred_to"),
            encoded,
            TTL_PERSISTENT,
        )
        .await
        .map_err(store_err)
    }

    pub async fn get_transferred_to(&self, caller: &str) -> Result<Option<QueueEntry>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .get(keys::caller_key(caller, "transferred_to"))
            .await
            .map_err(store_err)?;
        Ok(raw.as_deref().and_then(|r| serde_json::from_str(r).ok()))
    }

    // ── Intent memory ────────────────────────────────────────────

    pub async fn set_intent(&self, caller: &str, intent: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.set_ex(keys::caller_key(caller, "intent"), intent, TTL_PERSISTENT)
            .await
            .map_err(store_err)
    }

    pub async fn get_intent(&self, caller: &str) -> Result<Option<String>> {
        let mut con = self.con.clone();
        con.get(keys::caller_key(caller, "intent"))
            .await
            .map_err(store_err)
    }
}
