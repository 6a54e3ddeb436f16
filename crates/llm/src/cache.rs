//! Persistent result caches.
//!
//! Two disjoint caches share one disk layout (`<root>/<namespace>/<key>`):
//! a JSON cache for parsed LLM answers and a bytes cache for opaque blobs
//! (TTS audio). Namespaces are isolated in memory exactly as they are on
//! disk — the same key under two namespaces never collides. Both caches
//! eagerly load every existing entry at construction; reads hit the map,
//! writes go to disk and map. The key space is small and contended, so
//! writes take the lock briefly while reads clone out.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Key derivation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derive the cache key for a request input.
///
/// Non-empty string values are taken in key order, joined with ` | `, and
/// sanitized: NFD-normalized with combining marks stripped, lowercased,
/// every other character folded to `_`, runs collapsed, edges trimmed.
/// Inputs with no usable text fall back to the SHA-256 hex of the
/// JSON-serialized map.
pub fn derive_cache_key(input: &BTreeMap<String, String>) -> String {
    let values: Vec<&str> = input
        .values()
        .map(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .collect();

    if !values.is_empty() {
        let sanitized = sanitize(&values.join(" | "));
        if !sanitized.is_empty() {
            return sanitized;
        }
    }

    let json = serde_json::to_string(input).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}

fn sanitize(text: &str) -> String {
    let decomposed: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let mut key = String::with_capacity(decomposed.len());
    let mut pending_underscore = false;
    for c in decomposed.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_underscore && !key.is_empty() {
                key.push('_');
            }
            pending_underscore = false;
            key.push(c);
        } else {
            pending_underscore = true;
        }
    }
    key
}

/// Per-namespace entry maps, mirroring the on-disk directory layout.
type NamespaceMap<V> = HashMap<String, HashMap<String, V>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cache of parsed JSON values, one file per entry.
pub struct JsonCache {
    root: PathBuf,
    entries: RwLock<NamespaceMap<serde_json::Value>>,
}

impl JsonCache {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut entries: NamespaceMap<serde_json::Value> = HashMap::new();
        let mut count = 0usize;
        load_entries(&root, &mut |path, namespace, stem| {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return;
            }
            match std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
            {
                Some(value) => {
                    entries
                        .entry(namespace.to_string())
                        .or_default()
                        .insert(stem.to_string(), value);
                    count += 1;
                }
                None => tracing::warn!(path = %path.display(), "unreadable cache file skipped"),
            }
        });
        tracing::info!(
            entries = count,
            namespaces = entries.len(),
            root = %root.display(),
            "json cache loaded"
        );
        Self {
            root,
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<serde_json::Value> {
        self.entries.read().get(namespace)?.get(key).cloned()
    }

    pub fn set(&self, namespace: &str, key: &str, value: serde_json::Value) {
        let dir = self.root.join(namespace);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, "cache directory creation failed");
        } else {
            let path = dir.join(format!("{key}.json"));
            match serde_json::to_string_pretty(&value) {
                Ok(encoded) => {
                    if let Err(e) = std::fs::write(&path, encoded) {
                        tracing::warn!(path = %path.display(), error = %e, "cache write failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "cache value serialization failed"),
            }
        }
        self.entries
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bytes cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cache of opaque binary blobs (audio snippets).
pub struct BytesCache {
    root: PathBuf,
    entries: RwLock<NamespaceMap<Vec<u8>>>,
}

impl BytesCache {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut entries: NamespaceMap<Vec<u8>> = HashMap::new();
        let mut count = 0usize;
        load_entries(&root, &mut |path, namespace, stem| {
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                return;
            }
            match std::fs::read(path) {
                Ok(bytes) => {
                    entries
                        .entry(namespace.to_string())
                        .or_default()
                        .insert(stem.to_string(), bytes);
                    count += 1;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable cache file skipped"),
            }
        });
        tracing::info!(
            entries = count,
            namespaces = entries.len(),
            root = %root.display(),
            "bytes cache loaded"
        );
        Self {
            root,
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(namespace)?.get(key).cloned()
    }

    pub fn set(&self, namespace: &str, key: &str, extension: &str, bytes: Vec<u8>) {
        let dir = self.root.join(namespace);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, "cache directory creation failed");
        } else {
            let path = dir.join(format!("{key}.{extension}"));
            if let Err(e) = std::fs::write(&path, &bytes) {
                tracing::warn!(path = %path.display(), error = %e, "cache write failed");
            }
        }
        self.entries
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
    }
}

/// Walk `<root>/<namespace>/<file>` and feed every file to `visit` along
/// with its namespace directory name.
fn load_entries(root: &Path, visit: &mut dyn FnMut(&Path, &str, &str)) {
    let Ok(namespaces) = std::fs::read_dir(root) else {
        return;
    };
    for namespace_dir in namespaces.flatten() {
        if !namespace_dir.path().is_dir() {
            continue;
        }
        let namespace = namespace_dir.file_name();
        let Some(namespace) = namespace.to_str() else {
            continue;
        };
        let Ok(files) = std::fs::read_dir(namespace_dir.path()) else {
            continue;
        };
        for file in files.flatten() {
            let path = file.path();
            if !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                visit(&path, namespace, stem);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn key_sanitizes_umlauts_and_punctuation() {
        let key = derive_cache_key(&input(&[("text", "Hauptstraße 5, München!")]));
        assert_eq!(key, "hauptstra_e_5_munchen");
    }

    #[test]
    fn key_joins_values_in_key_order() {
        let key = derive_cache_key(&input(&[("b", "zwei"), ("a", "eins")]));
        assert_eq!(key, "eins_zwei");
    }

    #[test]
    fn key_skips_empty_values() {
        let key = derive_cache_key(&input(&[("a", "  "), ("b", "ja")]));
        assert_eq!(key, "ja");
    }

    #[test]
    fn key_falls_back_to_hash_without_text() {
        let key = derive_cache_key(&input(&[("a", ""), ("b", "   ")]));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across calls
        assert_eq!(key, derive_cache_key(&input(&[("a", ""), ("b", "   ")])));
    }

    #[test]
    fn key_falls_back_when_sanitize_empties() {
        let key = derive_cache_key(&input(&[("a", "???")]));
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn json_cache_roundtrip_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::open(dir.path());
        assert!(cache.get("yes_no", "greeting").is_none());

        cache.set("yes_no", "greeting", serde_json::json!({"is_agreement": true}));
        assert_eq!(
            cache.get("yes_no", "greeting").unwrap()["is_agreement"],
            serde_json::Value::Bool(true)
        );

        // A second instance sees the entry from disk, under its namespace.
        let reloaded = JsonCache::open(dir.path());
        assert!(reloaded.get("yes_no", "greeting").is_some());
        assert!(reloaded.get("classify_intent", "greeting").is_none());
    }

    #[test]
    fn json_cache_same_key_in_two_namespaces_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::open(dir.path());
        cache.set("classify_intent", "ja", serde_json::json!({"intent_str": "andere"}));
        cache.set("process_location", "ja", serde_json::json!({"knows_location": true}));

        assert_eq!(
            cache.get("classify_intent", "ja").unwrap()["intent_str"],
            serde_json::json!("andere")
        );
        assert_eq!(
            cache.get("process_location", "ja").unwrap()["knows_location"],
            serde_json::Value::Bool(true)
        );

        // Both survive a reload from disk.
        let reloaded = JsonCache::open(dir.path());
        assert!(reloaded.get("classify_intent", "ja").is_some());
        assert!(reloaded.get("process_location", "ja").is_some());
    }

    #[test]
    fn bytes_cache_roundtrip_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BytesCache::open(dir.path());
        cache.set("audio", "hallo", "mp3", vec![1, 2, 3]);
        assert_eq!(cache.get("audio", "hallo").unwrap(), vec![1, 2, 3]);
        assert!(cache.get("other", "hallo").is_none());

        let reloaded = BytesCache::open(dir.path());
        assert_eq!(reloaded.get("audio", "hallo").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn bytes_cache_same_key_in_two_namespaces_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BytesCache::open(dir.path());
        cache.set("audio", "hallo", "mp3", vec![1]);
        cache.set("ringtones", "hallo", "mp3", vec![2]);

        assert_eq!(cache.get("audio", "hallo").unwrap(), vec![1]);
        assert_eq!(cache.get("ringtones", "hallo").unwrap(), vec![2]);

        let reloaded = BytesCache::open(dir.path());
        assert_eq!(reloaded.get("audio", "hallo").unwrap(), vec![1]);
        assert_eq!(reloaded.get("ringtones", "hallo").unwrap(), vec![2]);
    }

    #[test]
    fn bytes_cache_ignores_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let json_cache = JsonCache::open(dir.path());
        json_cache.set("yes_no", "entry", serde_json::json!(1));

        let bytes_cache = BytesCache::open(dir.path());
        assert!(bytes_cache.get("yes_no", "entry").is_none());
    }
}
