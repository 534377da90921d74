//! Named response cache.
//!
//! A `CacheStorage` hands out named `Cache` handles; each cache maps a
//! `RequestIdentity` to the most recently stored `Response` snapshot. Writes
//! replace the whole snapshot. Two backends are provided:
//!
//! - `MemoryStorage`: process-local, used by tests and `cache_backend = "memory"`
//! - `DiskStorage`: one file per entry under the platform cache directory

use std::future::Future;

use futures::future::try_join_all;

use crate::error::WorkerError;
use crate::models::{CachedData, Request, RequestIdentity, Response};
use crate::network::Network;

pub mod disk;
pub mod error;
pub mod memory;

pub use disk::{DiskCache, DiskStorage};
pub use error::CacheError;
pub use memory::{MemoryCache, MemoryStorage};

/// Opens caches by name, creating them on first use.
pub trait CacheStorage: Clone + Send + Sync + 'static {
    type Cache: Cache;

    fn open(&self, name: &str) -> impl Future<Output = Result<Self::Cache, CacheError>> + Send;
}

/// A single named cache.
///
/// Implementations should ensure that cloning is cheap and clones always refer
/// to the same shared state.
pub trait Cache: Clone + Send + Sync + 'static {
    /// Exact lookup of a stored snapshot.
    fn match_request(
        &self,
        identity: &RequestIdentity,
    ) -> impl Future<Output = Result<Option<Response>, CacheError>> + Send;

    /// Replace the entry for `identity` with `response`.
    fn put(
        &self,
        identity: RequestIdentity,
        response: Response,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn put_all(
        &self,
        entries: Vec<(RequestIdentity, Response)>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Every stored identity with the time it was written.
    fn keys(
        &self,
    ) -> impl Future<Output = Result<Vec<CachedData<RequestIdentity>>, CacheError>> + Send;

    /// Fetch every request and store the results, or store nothing.
    ///
    /// Fetches run concurrently. Any transport failure or uncacheable status
    /// aborts the whole batch before a single entry is written.
    fn add_all<N: Network>(
        &self,
        network: &N,
        requests: &[Request],
    ) -> impl Future<Output = Result<(), WorkerError>> + Send {
        async move {
            let fetches = requests.iter().map(|request| async move {
                let identity = RequestIdentity::of(request).ok_or_else(|| CacheError::NonGetKey {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                })?;
                let response = network
                    .fetch(request)
                    .await
                    .map_err(|source| WorkerError::Fetch {
                        url: request.url().to_string(),
                        source,
                    })?;
                if !response.is_cacheable() {
                    return Err(WorkerError::bad_status(request.url().as_str(), &response));
                }
                Ok::<_, WorkerError>((identity, response))
            });

            let entries = try_join_all(fetches).await?;
            self.put_all(entries).await?;
            Ok(())
        }
    }
}
