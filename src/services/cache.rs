//! Provider response cache.
//!
//! One file per key, a human-readable JSON envelope `{data, cached_at}`.
//! The cache is advisory: read errors fall back to a miss (corrupt files are
//! deleted), write errors are logged and swallowed. Negative entries record
//! a provider-confirmed "not found" (`data: null`) so known misses are not
//! re-queried within the TTL.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Addresses one cached provider response.
///
/// `provider`/`kind` select the directory (`<root>/<provider>/<kind>/`),
/// `name` is a readable filename stem, and `seed` is the full request
/// identity that gets hashed into the filename so distinct queries with the
/// same stem cannot collide.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub provider: &'static str,
    pub kind: &'static str,
    pub name: String,
    pub seed: String,
}

impl CacheKey {
    /// Key for an entity lookup by external id.
    pub fn entity(provider: &'static str, kind: &'static str, id: &str) -> Self {
        Self {
            provider,
            kind,
            name: id.to_string(),
            seed: id.to_string(),
        }
    }

    /// Key for a search, hashed over the normalized query plus parameters.
    pub fn search(provider: &'static str, name: &str, query: &str) -> Self {
        Self {
            provider,
            kind: "searches",
            name: name.to_string(),
            seed: query.to_string(),
        }
    }

    fn filename(&self) -> String {
        let safe: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .take(50)
            .collect();
        let digest = md5::compute(self.seed.as_bytes());
        format!("{}_{:x}.json", safe, digest)
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A valid entry with a payload.
    Hit(serde_json::Value),
    /// A valid entry recording that the provider confirmed absence.
    NegativeHit,
    /// No entry, expired entry, or unreadable entry.
    Miss,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    data: serde_json::Value,
    cached_at: DateTime<Utc>,
}

/// Cache interface taken by the provider clients.
pub trait ResponseCache: Send + Sync {
    fn load(&self, key: &CacheKey) -> CacheLookup;
    fn store(&self, key: &CacheKey, value: &serde_json::Value);
    fn store_negative(&self, key: &CacheKey);
}

/// Filesystem-backed cache, the default implementation.
pub struct FsCache {
    root: PathBuf,
    ttl: Duration,
    force_refresh: bool,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>, ttl_days: u32, force_refresh: bool) -> Self {
        Self {
            root: root.into(),
            ttl: Duration::days(i64::from(ttl_days)),
            force_refresh,
        }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.provider)
            .join(key.kind)
            .join(key.filename())
    }

    fn write_envelope(&self, key: &CacheKey, data: serde_json::Value) {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!("Failed to create cache directory {}: {}", parent.display(), e);
                return;
            }
        }

        let envelope = CacheEnvelope {
            data,
            cached_at: Utc::now(),
        };

        match serde_json::to_string_pretty(&envelope) {
            Ok(body) => {
                if let Err(e) = fs::write(&path, body) {
                    tracing::warn!("Failed to write cache file {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", path.display(), e);
            }
        }
    }

    fn read_envelope(&self, path: &Path) -> Option<CacheEnvelope> {
        let body = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<CacheEnvelope>(&body) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!("Deleting corrupt cache file {}: {}", path.display(), e);
                let _ = fs::remove_file(path);
                None
            }
        }
    }
}

impl ResponseCache for FsCache {
    fn load(&self, key: &CacheKey) -> CacheLookup {
        if self.force_refresh {
            return CacheLookup::Miss;
        }

        let path = self.path_for(key);
        if !path.exists() {
            return CacheLookup::Miss;
        }

        let Some(envelope) = self.read_envelope(&path) else {
            return CacheLookup::Miss;
        };

        let age = Utc::now() - envelope.cached_at;
        if age > self.ttl {
            tracing::debug!("Cache expired ({} days): {}", age.num_days(), path.display());
            return CacheLookup::Miss;
        }

        if envelope.data.is_null() {
            tracing::debug!("Negative cache hit: {}", path.display());
            CacheLookup::NegativeHit
        } else {
            tracing::debug!("Cache hit: {}", path.display());
            CacheLookup::Hit(envelope.data)
        }
    }

    fn store(&self, key: &CacheKey, value: &serde_json::Value) {
        self.write_envelope(key, value.clone());
    }

    fn store_negative(&self, key: &CacheKey) {
        self.write_envelope(key, serde_json::Value::Null);
    }
}

/// In-memory cache for tests. No TTL; entries live as long as the instance.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_string(key: &CacheKey) -> String {
        format!("{}/{}/{}", key.provider, key.kind, key.filename())
    }
}

impl ResponseCache for MemoryCache {
    fn load(&self, key: &CacheKey) -> CacheLookup {
        match self.entries.lock().unwrap().get(&Self::key_string(key)) {
            Some(value) if value.is_null() => CacheLookup::NegativeHit,
            Some(value) => CacheLookup::Hit(value.clone()),
            None => CacheLookup::Miss,
        }
    }

    fn store(&self, key: &CacheKey, value: &serde_json::Value) {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::key_string(key), value.clone());
    }

    fn store_negative(&self, key: &CacheKey) {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::key_string(key), serde_json::Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_cache(ttl_days: u32) -> (tempfile::TempDir, FsCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path(), ttl_days, false);
        (dir, cache)
    }

    #[test]
    fn store_then_load_round_trips_payload() {
        let (_dir, cache) = temp_cache(30);
        let key = CacheKey::entity("musicbrainz", "works", "abc-123");
        let payload = json!({"title": "Take Five", "recordings": [1, 2, 3]});

        cache.store(&key, &payload);
        assert_eq!(cache.load(&key), CacheLookup::Hit(payload));
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let (_dir, cache) = temp_cache(30);
        let key = CacheKey::entity("musicbrainz", "works", "nope");
        assert_eq!(cache.load(&key), CacheLookup::Miss);
    }

    #[test]
    fn negative_entry_is_distinct_from_miss() {
        let (_dir, cache) = temp_cache(30);
        let key = CacheKey::entity("musicbrainz", "recordings", "gone");

        cache.store_negative(&key);
        assert_eq!(cache.load(&key), CacheLookup::NegativeHit);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path(), 7, false);
        let key = CacheKey::entity("jazzstandards", "pages", "takefive");

        // Write an envelope dated well past the TTL.
        let path = cache.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let stale = json!({
            "data": {"composer": "Paul Desmond"},
            "cached_at": Utc::now() - Duration::days(30),
        });
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        assert_eq!(cache.load(&key), CacheLookup::Miss);
    }

    #[test]
    fn corrupt_file_is_deleted_and_treated_as_miss() {
        let (_dir, cache) = temp_cache(30);
        let key = CacheKey::entity("itunes", "albums", "12345");

        let path = cache.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json {{{").unwrap();

        assert_eq!(cache.load(&key), CacheLookup::Miss);
        assert!(!path.exists());
    }

    #[test]
    fn force_refresh_bypasses_reads_but_not_writes() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::entity("spotify", "tracks", "t1");
        let payload = json!({"id": "t1"});

        let forced = FsCache::new(dir.path(), 30, true);
        forced.store(&key, &payload);
        assert_eq!(forced.load(&key), CacheLookup::Miss);

        // A non-forcing handle over the same directory sees the write.
        let normal = FsCache::new(dir.path(), 30, false);
        assert_eq!(normal.load(&key), CacheLookup::Hit(payload));
    }

    #[test]
    fn distinct_queries_with_same_stem_do_not_collide() {
        let (_dir, cache) = temp_cache(30);
        let a = CacheKey::search("musicbrainz", "take five", "take five||Paul Desmond");
        let b = CacheKey::search("musicbrainz", "take five", "take five||Dave Brubeck");

        cache.store(&a, &json!(1));
        cache.store(&b, &json!(2));

        assert_eq!(cache.load(&a), CacheLookup::Hit(json!(1)));
        assert_eq!(cache.load(&b), CacheLookup::Hit(json!(2)));
    }

    #[test]
    fn memory_cache_mirrors_fs_semantics() {
        let cache = MemoryCache::new();
        let key = CacheKey::entity("musicbrainz", "artists", "mbid-1");

        assert_eq!(cache.load(&key), CacheLookup::Miss);
        cache.store(&key, &json!({"name": "Paul Desmond"}));
        assert!(matches!(cache.load(&key), CacheLookup::Hit(_)));
        cache.store_negative(&key);
        assert_eq!(cache.load(&key), CacheLookup::NegativeHit);
    }
}
