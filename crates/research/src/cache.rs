//! Content-Addressed Response Cache
//!
//! One JSON file per request hash under a cache directory. Presence of
//! the file is the only existence check; entries are immutable once
//! written and there is no expiry. Read failures degrade to a cache
//! miss so a corrupted entry can never block a run.

use std::path::{Path, PathBuf};

use crate::types::ResearchOutput;

/// File-backed cache of validated research responses, keyed by the
/// SHA-256 hash of the request payload.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Create a handle for the given cache directory. The directory is
    /// created lazily on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Look up a cached response. Any read or parse failure is treated
    /// as a miss.
    pub fn get(&self, key: &str) -> Option<ResearchOutput> {
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("cache entry unreadable ({}): {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(obj) => Some(obj),
            Err(e) => {
                tracing::warn!("cache entry corrupt ({}): {}", path.display(), e);
                None
            }
        }
    }

    /// Store a validated response under its content hash. Best-effort:
    /// a failed write is logged and swallowed, since the cache is an
    /// optimization, not a correctness requirement.
    pub fn put(&self, key: &str, value: &ResearchOutput) {
        if let Err(e) = self.try_put(key, value) {
            tracing::warn!("cache store failed for {}: {}", key, e);
        }
    }

    fn try_put(&self, key: &str, value: &ResearchOutput) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.entry_path(key), text)
    }
}
