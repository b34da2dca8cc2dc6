//! Program Binary Cache
//!
//! Keeps driver program binaries across process runs, keyed by a stable
//! 64-bit fingerprint of (shader definition, static parameters). Stored as a
//! JSON document with base64 blobs.
//!
//! Compatibility is not checked here: a stale binary is simply rejected by the
//! driver on load and replaced after the source compile.

use std::path::Path;

use log::{debug, info};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::device::ProgramBinary;
use crate::errors::Result;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<CacheEntry>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: u64,
    binary: ProgramBinary,
}

/// Thread-safe map of fingerprint → program binary.
#[derive(Debug, Default)]
pub struct ProgramBinaryCache {
    entries: Mutex<FxHashMap<u64, ProgramBinary>>,
}

impl ProgramBinaryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<ProgramBinary> {
        self.entries.lock().get(&key).cloned()
    }

    pub fn insert(&self, key: u64, binary: ProgramBinary) {
        self.entries.lock().insert(key, binary);
    }

    pub fn remove(&self, key: u64) -> Option<ProgramBinary> {
        self.entries.lock().remove(&key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(&key, binary)| CacheEntry {
                key,
                binary: binary.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.key);
        Ok(serde_json::to_string(&CacheFile { entries })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CacheFile = serde_json::from_str(json)?;
        let entries = file
            .entries
            .into_iter()
            .map(|e| (e.key, e.binary))
            .collect();
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("Saved {} program binaries to {}", self.len(), path.display());
        Ok(())
    }

    /// Loads a cache file. A missing file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let cache = Self::from_json(&json)?;
                debug!("Loaded {} program binaries from {}", cache.len(), path.display());
                Ok(cache)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_entries() {
        let cache = ProgramBinaryCache::new();
        cache.insert(42, ProgramBinary::new(1, vec![1, 2, 3]));
        cache.insert(7, ProgramBinary::new(1, vec![9]));

        let restored = ProgramBinaryCache::from_json(&cache.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(42), Some(ProgramBinary::new(1, vec![1, 2, 3])));
    }

    #[test]
    fn corrupt_blob_is_a_json_error() {
        let json = r#"{"entries":[{"key":1,"binary":{"format":1,"bytes":"not base64!"}}]}"#;
        let err = ProgramBinaryCache::from_json(json).unwrap_err();
        assert!(matches!(err, crate::errors::ShaderError::JsonError(_)), "{err}");
    }

    #[test]
    fn missing_file_is_empty_cache() {
        let cache = ProgramBinaryCache::load("/nonexistent/dir/binaries.json").unwrap();
        assert!(cache.is_empty());
    }
}
