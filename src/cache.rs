//! Keyed artifact cache with atomic writes.
//!
//! Noise tables take minutes to build from full-resolution rasters, so
//! they are cached on disk keyed by (tile, footprint, parameter
//! fingerprint). Writes go through a temp file plus rename, so a reader
//! never observes a half-written artifact and same-key writers on one
//! filesystem settle on a complete file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache artifact is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Directory-backed cache of JSON artifacts addressed by content keys.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive a cache key from identifying parts (tile name, footprint
    /// label, parameter fingerprint, ...). Order matters.
    pub fn key(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]); // separator so ("ab","c") != ("a","bc")
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(32);
        for byte in &digest[..16] {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Load the artifact under `key`, or None if absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Store an artifact under `key` atomically (temp file + rename).
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Return the cached artifact for `key`, or compute, persist and
    /// return it.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, CacheError>,
    {
        if let Some(cached) = self.get(key)? {
            return Ok(cached);
        }
        debug!(key, "cache miss, computing artifact");
        let value = compute()?;
        self.put(key, &value)?;
        Ok(value)
    }
}
