use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Only GET requests can be cache keys, got {method} {url}")]
    NonGetKey { method: String, url: String },
}
