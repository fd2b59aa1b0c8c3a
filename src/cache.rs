//! On-disk cache for GitHub API responses.
//!
//! Each successful GET is stored as a small JSON file holding the response
//! body and its `ETag`. Later identical requests revalidate with
//! `If-None-Match`; GitHub answers `304 Not Modified` without charging the
//! rate limit, and the stored body is reused.
//!
//! The cache is strictly an optimization. Every read or write failure is
//! reported to the caller as a miss or ignored, never as a lookup error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the application directory inside the user cache directory.
pub const APP_DIR: &str = "actlock";

/// A stored response body with the validator needed to revalidate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub etag: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Platform cache location, e.g. `$XDG_CACHE_HOME/actlock` on Linux.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Cache key for a request. Authenticated and anonymous responses are kept
    /// apart since they can differ for private repositories.
    pub fn key(url: &str, authenticated: bool) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(if authenticated { b"|auth" } else { b"|anon" });
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let path = self.entry_path(key);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "ignoring corrupt cache entry");
                None
            }
        }
    }

    /// Stores an entry, writing to a temporary file first so readers never
    /// observe a half-written entry.
    pub fn put(&self, key: &str, entry: &CachedResponse) -> Result<()> {
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(entry)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Missing,
    Removed,
}

/// Removes the cache directory and everything in it.
pub fn clear(dir: &Path) -> Result<ClearOutcome> {
    if !dir.exists() {
        return Ok(ClearOutcome::Missing);
    }
    fs::remove_dir_all(dir)
        .with_context(|| format!("Failed removing cache directory {}", dir.display()))?;
    if dir.exists() {
        anyhow::bail!(
            "Attempted to remove cache directory {}, but it still exists",
            dir.display()
        );
    }
    Ok(ClearOutcome::Removed)
}
