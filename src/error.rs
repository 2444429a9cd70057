//! Typed error taxonomy (spec §7). Call sites that need `?` into an
//! `anyhow::Result` get it for free via `thiserror`'s generated `From` impl;
//! call sites that need to branch on the failure kind match on the variant.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChantalError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("catalog schema is stale; run the migration tool before continuing")]
    SchemaStale,

    #[error("pool corruption at {path}: existing file does not match its own name")]
    PoolCorruption { path: PathBuf },

    #[error("pool miss: no object {sha256} in the pool")]
    PoolMiss { sha256: String },
}

pub type Result<T> = std::result::Result<T, ChantalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_for_checksum_mismatch() {
        let err = ChantalError::ChecksumMismatch {
            path: PathBuf::from("/pool/content/ab/cd/abcd_x.rpm"),
            expected: "abcd".into(),
            actual: "ffff".into(),
        };
        assert!(err.to_string().contains("expected abcd, got ffff"));
    }
}
