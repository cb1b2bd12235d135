//! Optional on-disk HTTP response cache (spec §9's `ENABLE_CACHE`). Off by
//! default — `NoopCache` is what the Search Adapter and Page Parser get
//! unless both `Settings::enable_cache` is set and the crate was built with
//! the `cache` feature, mirroring the original's "auto-enabled when a cache
//! library is present" posture without making the default build depend on
//! one.

use std::sync::Arc;

use crate::config::Settings;

pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str);
}

pub struct NoopCache;

impl ResponseCache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn put(&self, _key: &str, _value: &str) {}
}

/// TTL-keyed JSON-on-disk store: one file per cache key, named by a hash of
/// the key, holding the fetched body plus the time it was stored.
#[cfg(feature = "cache")]
pub struct DiskCache {
    dir: std::path::PathBuf,
    ttl: std::time::Duration,
}

#[cfg(feature = "cache")]
#[derive(serde::Serialize, serde::Deserialize)]
struct Entry {
    stored_at_secs: u64,
    body: String,
}

#[cfg(feature = "cache")]
impl DiskCache {
    pub fn new(dir: std::path::PathBuf, ttl: std::time::Duration) -> Self {
        let _ = std::fs::create_dir_all(&dir);
        Self { dir, ttl }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        self.dir.join(format!("{:x}.json", hasher.finish()))
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(feature = "cache")]
impl ResponseCache for DiskCache {
    fn get(&self, key: &str) -> Option<String> {
        let text = std::fs::read_to_string(self.path_for(key)).ok()?;
        let entry: Entry = serde_json::from_str(&text).ok()?;
        if Self::now_secs().saturating_sub(entry.stored_at_secs) > self.ttl.as_secs() {
            return None;
        }
        Some(entry.body)
    }

    fn put(&self, key: &str, value: &str) {
        let entry = Entry {
            stored_at_secs: Self::now_secs(),
            body: value.to_string(),
        };
        if let Ok(text) = serde_json::to_string(&entry) {
            let _ = std::fs::write(self.path_for(key), text);
        }
    }
}

/// 24h TTL, matching the original's default cache expiry.
#[cfg(feature = "cache")]
const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

pub fn build_cache(settings: &Settings) -> Arc<dyn ResponseCache> {
    #[cfg(feature = "cache")]
    {
        if settings.enable_cache {
            if let Some(dir) = dirs::cache_dir().map(|d| d.join("catalog-matcher")) {
                return Arc::new(DiskCache::new(dir, DEFAULT_TTL));
            }
        }
    }
    #[cfg(not(feature = "cache"))]
    let _ = settings;
    Arc::new(NoopCache)
}
