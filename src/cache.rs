//! Metadata cache (§4.3): a TTL- and checksum-keyed store of large
//! compressed metadata blobs, independent of the pool, so that repeat syncs
//! skip re-downloading an unchanged `primary.xml.gz`/`Packages.gz`/etc.
//! Grounded on `original_source/core/cache.py`'s `MetadataCache`.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use log::{debug, info};

use crate::{
    error::{ChantalError, Result},
    pool::sha256sum_sync,
};

pub struct CacheStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub oldest_file_age_hours: Option<f64>,
    pub newest_file_age_hours: Option<f64>,
}

pub struct MetadataCache {
    cache_path: Option<PathBuf>,
    max_age_hours: Option<u64>,
}

impl MetadataCache {
    /// `enabled = false` or `cache_path = None` disables the cache outright;
    /// every `get` misses and every `put` is a no-op returning its input
    /// checksum's would-be path without writing anything.
    pub fn new(cache_path: Option<PathBuf>, max_age_hours: Option<u64>, enabled: bool) -> Result<Self> {
        let cache_path = if enabled { cache_path } else { None };
        if let Some(path) = &cache_path {
            std::fs::create_dir_all(path)
                .map_err(|e| ChantalError::Integrity(format!("creating cache dir {}: {e}", path.display())))?;
            info!("metadata cache enabled: {}", path.display());
        }
        Ok(MetadataCache {
            cache_path,
            max_age_hours,
        })
    }

    fn entry_path(&self, checksum: &str) -> Option<PathBuf> {
        self.cache_path.as_ref().map(|p| p.join(format!("{checksum}.blob")))
    }

    /// Returns the cached file's path iff present and, when a TTL is
    /// configured, still within `max_age_hours` of its mtime. An expired
    /// entry is removed and treated as a miss.
    pub fn get(&self, checksum: &str) -> Option<PathBuf> {
        let entry = self.entry_path(checksum)?;
        if !entry.is_file() {
            debug!("cache miss: {}", &checksum[..16.min(checksum.len())]);
            return None;
        }
        if !self.is_valid(&entry) {
            debug!("cache expired: {}", &checksum[..16.min(checksum.len())]);
            let _ = std::fs::remove_file(&entry);
            return None;
        }
        debug!("cache hit: {}", &checksum[..16.min(checksum.len())]);
        Some(entry)
    }

    /// Writes `content` into the cache under `checksum`, atomically (temp +
    /// rename), after verifying `sha256(content) == checksum`.
    pub fn put(&self, checksum: &str, content: &[u8]) -> Result<PathBuf> {
        let Some(entry) = self.entry_path(checksum) else {
            return Ok(PathBuf::from("/dev/null"));
        };
        let actual = sha256sum_sync(content)?;
        if actual != checksum {
            return Err(ChantalError::ChecksumMismatch {
                path: entry.clone(),
                expected: checksum.to_string(),
                actual,
            });
        }
        let tmp = entry.with_extension("tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| ChantalError::Integrity(format!("writing cache temp file: {e}")))?;
        std::fs::rename(&tmp, &entry)
            .map_err(|e| ChantalError::Integrity(format!("renaming cache entry: {e}")))?;
        info!(
            "cached metadata blob {} ({:.2} MB)",
            &checksum[..16.min(checksum.len())],
            content.len() as f64 / 1024.0 / 1024.0
        );
        Ok(entry)
    }

    fn is_valid(&self, path: &Path) -> bool {
        let Some(max_age_hours) = self.max_age_hours else {
            return true;
        };
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return true;
        };
        let age_hours = SystemTime::now()
            .duration_since(modified)
            .map(|d| d.as_secs_f64() / 3600.0)
            .unwrap_or(0.0);
        age_hours <= max_age_hours as f64
    }

    /// Deletes every cached entry. Returns the count removed.
    pub fn clear(&self) -> usize {
        let Some(path) = &self.cache_path else {
            return 0;
        };
        let mut removed = 0;
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("blob")
                    && std::fs::remove_file(entry.path()).is_ok()
                {
                    removed += 1;
                }
            }
        }
        info!("cleared {removed} cache file(s)");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let Some(path) = &self.cache_path else {
            return CacheStats {
                total_files: 0,
                total_size_bytes: 0,
                oldest_file_age_hours: None,
                newest_file_age_hours: None,
            };
        };
        let mut total_files = 0;
        let mut total_size_bytes = 0;
        let mut oldest: Option<SystemTime> = None;
        let mut newest: Option<SystemTime> = None;
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                let Ok(metadata) = entry.metadata() else { continue };
                if !metadata.is_file() {
                    continue;
                }
                total_files += 1;
                total_size_bytes += metadata.len();
                if let Ok(mtime) = metadata.modified() {
                    oldest = Some(oldest.map_or(mtime, |o| o.min(mtime)));
                    newest = Some(newest.map_or(mtime, |n| n.max(mtime)));
                }
            }
        }
        let age_hours = |t: SystemTime| {
            SystemTime::now()
                .duration_since(t)
                .map(|d| d.as_secs_f64() / 3600.0)
                .unwrap_or(0.0)
        };
        CacheStats {
            total_files,
            total_size_bytes,
            oldest_file_age_hours: oldest.map(age_hours),
            newest_file_age_hours: newest.map(age_hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(Some(dir.path().to_path_buf()), None, true).unwrap();
        let content = b"primary.xml.gz bytes";
        let checksum = sha256sum_sync(&content[..]).unwrap();
        let path = cache.put(&checksum, content).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert_eq!(cache.get(&checksum), Some(path));
    }

    #[test]
    fn put_rejects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(Some(dir.path().to_path_buf()), None, true).unwrap();
        assert!(cache.put("deadbeef", b"content").is_err());
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = MetadataCache::new(None, None, false).unwrap();
        assert!(cache.get("anything").is_none());
    }
}
