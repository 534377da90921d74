use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{CachedData, RequestIdentity, Response};

use super::{Cache, CacheError, CacheStorage};

type Entries = HashMap<RequestIdentity, CachedData<Response>>;

/// Process-local cache storage. Contents are lost when the process exits.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    caches: Arc<RwLock<HashMap<String, MemoryCache>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    type Cache = MemoryCache;

    async fn open(&self, name: &str) -> Result<MemoryCache, CacheError> {
        let mut caches = self.caches.write().await;
        Ok(caches.entry(name.to_string()).or_default().clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<Entries>>,
}

fn ensure_get(identity: &RequestIdentity) -> Result<(), CacheError> {
    if identity.is_get() {
        Ok(())
    } else {
        Err(CacheError::NonGetKey {
            method: identity.method.clone(),
            url: identity.url.clone(),
        })
    }
}

impl Cache for MemoryCache {
    async fn match_request(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Option<Response>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(identity).map(|cached| cached.data.clone()))
    }

    async fn put(&self, identity: RequestIdentity, response: Response) -> Result<(), CacheError> {
        ensure_get(&identity)?;
        self.entries
            .write()
            .await
            .insert(identity, CachedData::new(response));
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(RequestIdentity, Response)>) -> Result<(), CacheError> {
        for (identity, _) in &entries {
            ensure_get(identity)?;
        }
        let mut stored = self.entries.write().await;
        for (identity, response) in entries {
            stored.insert(identity, CachedData::new(response));
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CachedData<RequestIdentity>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .map(|(identity, cached)| CachedData {
                data: identity.clone(),
                cached_at: cached.cached_at,
            })
            .collect())
    }
}
