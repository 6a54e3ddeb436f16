//! Per-service configuration store and the dashboard auth-token cache.
//!
//! Settings are JSON blobs under `notdienststation:config:…`, written by
//! the dashboard and read (never written) during calls.

use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use nd_domain::settings::{
    ActiveHours, Announcements, DirectForwarding, EmergencyContact, Pricing, ProviderLocation,
    ServiceNumber, TransferSettings, VacationMode,
};
use nd_domain::Result;

use crate::keys::{self, TTL_AUTH_TOKEN};
use crate::store_err;

const VACATION_KEY: &str = "notdienststation:config:global:vacation";

#[derive(Clone)]
pub struct SettingsStore {
    con: redis::aio::ConnectionManager,
}

impl SettingsStore {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, key: String) -> Result<T> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(&key).await.map_err(store_err)?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::error!(key, error = %e, "malformed settings blob, using defaults");
                T::default()
            })),
            None => Ok(T::default()),
        }
    }

    async fn set_json<T: Serialize>(&self, key: String, value: &T) -> Result<()> {
        let mut con = self.con.clone();
        let encoded = serde_json::to_string(value)?;
        con.set(&key, encoded).await.map_err(store_err)
    }

    // ── Per-service settings ─────────────────────────────────────

    pub async fn pricing(&self, service: &str) -> Result<Pricing> {
        self.get_json(keys::service_config_key(service, "pricing"))
            .await
    }

    pub async fn active_hours(&self, service: &str) -> Result<ActiveHours> {
        self.get_json(keys::service_config_key(service, "active_hours"))
            .await
    }

    pub async fn set_active_hours(&self, service: &str, hours: &ActiveHours) -> Result<()> {
        self.set_json(keys::service_config_key(service, "active_hours"), hours)
            .await
    }

    pub async fn announcements(&self, service: &str) -> Result<Announcements> {
        self.get_json(keys::service_config_key(service, "announcements"))
            .await
    }

    pub async fn emergency_contact(&self, service: &str) -> Result<EmergencyContact> {
        self.get_json(keys::service_config_key(service, "emergency_contact"))
            .await
    }

    pub async fn direct_forwarding(&self, service: &str) -> Result<DirectForwarding> {
        self.get_json(keys::service_config_key(service, "direct_forwarding"))
            .await
    }

    pub async fn transfer_settings(&self, service: &str) -> Result<TransferSettings> {
        self.get_json(keys::service_config_key(service, "transfer_settings"))
            .await
    }

    pub async fn service_number(&self, service: &str) -> Result<ServiceNumber> {
        self.get_json(keys::service_config_key(service, "phone_number"))
            .await
    }

    pub async fn locations(&self, service: &str) -> Result<Vec<ProviderLocation>> {
        self.get_json(keys::locations_key(service)).await
    }

    pub async fn set_locations(
        &self,
        service: &str,
        locations: &[ProviderLocation],
    ) -> Result<()> {
        self.set_json(keys::locations_key(service), &locations.to_vec())
            .await
    }

    // ── Global settings ──────────────────────────────────────────

    pub async fn vacation_mode(&self) -> Result<VacationMode> {
        self.get_json(VACATION_KEY.to_string()).await
    }

    pub async fn set_vacation_mode(&self, vacation: &VacationMode) -> Result<()> {
        self.set_json(VACATION_KEY.to_string(), vacation).await
    }

    // ── Service resolution ───────────────────────────────────────

    /// Map the dialed number to a service id by comparing against each
    /// configured service number (whitespace-insensitive).
    pub async fn resolve_service(
        &self,
        services: &[String],
        called_number: &str,
    ) -> Result<Option<String>> {
        let needle: String = called_number.split_whitespace().collect();
        if needle.is_empty() {
            return Ok(None);
        }
        for service in services {
            let number = self.service_number(service).await?;
            let candidate: String = number.phone_number.split_whitespace().collect();
            if !candidate.is_empty() && candidate == needle {
                return Ok(Some(service.clone()));
            }
        }
        Ok(None)
    }

    // ── Auth token cache ─────────────────────────────────────────

    /// SHA-256 hex of a bearer token; the raw token never becomes a key.
    pub fn token_hash(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    pub async fn is_token_cached(&self, token_hash: &str) -> Result<bool> {
        let mut con = self.con.clone();
        let cached: Option<String> = con
            .get(keys::auth_token_key(token_hash))
            .await
            .map_err(store_err)?;
        Ok(cached.as_deref() == Some("valid"))
    }

    pub async fn cache_token(&self, token_hash: &str) -> Result<()> {
        let mut con = self.con.clone();
        con.set_ex(keys::auth_token_key(token_hash), "valid", TTL_AUTH_TOKEN)
            .await
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_sha256_hex() {
        let hash = SettingsStore::token_hash("secret-token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic
        assert_eq!(hash, SettingsStore::token_hash("secret-token"));
        assert_ne!(hash, SettingsStore::token_hash("other-token"));
    }
}
