//! Durable cache storage on the local filesystem.
//!
//! Layout: `<root>/<cache name>/<sha256 of "METHOD URL">.entry`. An entry file
//! is one line of JSON metadata followed by the raw body bytes. Every write
//! lands in a temporary file first and is renamed over the entry, so readers
//! only ever see complete snapshots.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::{CachedData, RequestIdentity, Response};

use super::{Cache, CacheError, CacheStorage};

const ENTRY_EXTENSION: &str = "entry";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    identity: RequestIdentity,
    status: u16,
    headers: Vec<(String, String)>,
    url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CacheStorage for DiskStorage {
    type Cache = DiskCache;

    async fn open(&self, name: &str) -> Result<DiskCache, CacheError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(DiskCache { dir: Arc::new(dir) })
    }
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: Arc<PathBuf>,
}

impl DiskCache {
    fn entry_path(&self, identity: &RequestIdentity) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(identity.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(format!("{}.{}", digest, ENTRY_EXTENSION))
    }

    async fn read_entry(
        path: &Path,
    ) -> Result<Option<(CachedData<EntryMeta>, Vec<u8>)>, CacheError> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| corrupt("missing metadata line".to_string()))?;
        let meta: CachedData<EntryMeta> =
            serde_json::from_slice(&contents[..split]).map_err(|e| corrupt(e.to_string()))?;
        let body = contents[split + 1..].to_vec();
        Ok(Some((meta, body)))
    }

    /// Write the entry to a uniquely named temporary file next to its final
    /// path. Returns `(tmp, final)`; nothing is visible to readers yet.
    async fn stage_entry(
        &self,
        identity: RequestIdentity,
        response: Response,
        cached_at: DateTime<Utc>,
    ) -> Result<(PathBuf, PathBuf), CacheError> {
        if !identity.is_get() {
            return Err(CacheError::NonGetKey {
                method: identity.method,
                url: identity.url,
            });
        }

        let path = self.entry_path(&identity);
        let meta = CachedData {
            data: EntryMeta {
                identity,
                status: response.status().as_u16(),
                headers: response.headers().to_vec(),
                url: response.url().map(|u| u.to_string()),
            },
            cached_at,
        };

        // Compact JSON escapes newlines inside strings, so the first raw
        // newline always terminates the metadata.
        let mut contents = serde_json::to_vec(&meta).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.into_body());

        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = tokio::fs::write(&tmp, &contents).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok((tmp, path))
    }

    async fn commit(tmp: &Path, path: &Path) -> Result<(), CacheError> {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            discard(tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), "Stored cache entry");
        Ok(())
    }
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %tmp.display(), error = %e, "Could not remove temporary cache file");
        }
    }
}

impl Cache for DiskCache {
    async fn match_request(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Option<Response>, CacheError> {
        let path = self.entry_path(identity);
        let Some((meta, body)) = Self::read_entry(&path).await? else {
            return Ok(None);
        };
        if meta.data.identity != *identity {
            warn!(
                expected = %identity,
                found = %meta.data.identity,
                "Cache entry identity mismatch"
            );
            return Ok(None);
        }

        let status = StatusCode::from_u16(meta.data.status).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut response = Response::new(status, body).with_headers(meta.data.headers);
        if let Some(url) = meta.data.url.as_deref().and_then(|u| reqwest::Url::parse(u).ok()) {
            response = response.with_url(url);
        }
        Ok(Some(response))
    }

    async fn put(&self, identity: RequestIdentity, response: Response) -> Result<(), CacheError> {
        let (tmp, path) = self.stage_entry(identity, response, Utc::now()).await?;
        Self::commit(&tmp, &path).await
    }

    /// Every entry is staged before any is renamed into place, so a failed
    /// write leaves the cache as it was.
    async fn put_all(&self, entries: Vec<(RequestIdentity, Response)>) -> Result<(), CacheError> {
        let cached_at = Utc::now();
        let mut staged = Vec::with_capacity(entries.len());
        for (identity, response) in entries {
            match self.stage_entry(identity, response, cached_at).await {
                Ok(pair) => staged.push(pair),
                Err(e) => {
                    for (tmp, _) in &staged {
                        discard(tmp).await;
                    }
                    return Err(e);
                }
            }
        }

        let mut result = Ok(());
        for (tmp, path) in &staged {
            if result.is_ok() {
                result = Self::commit(tmp, path).await;
            } else {
                discard(tmp).await;
            }
        }
        result
    }

    async fn keys(&self) -> Result<Vec<CachedData<RequestIdentity>>, CacheError> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(self.dir.as_path()).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some((meta, _))) => keys.push(meta.map(|m| m.identity)),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry")
                }
            }
        }
        Ok(keys)
    }
}
