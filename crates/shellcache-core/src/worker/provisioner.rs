use std::sync::Arc;

use tracing::info;

use crate::cache::{Cache, CacheStorage};
use crate::error::WorkerError;
use crate::network::Network;

use super::seed::{SeedSet, CACHE_NAME};

/// Populates the cache with the seed set at install time.
#[derive(Clone)]
pub struct Provisioner<S, N> {
    storage: S,
    network: N,
    seeds: Arc<SeedSet>,
}

impl<S: CacheStorage, N: Network> Provisioner<S, N> {
    pub fn new(storage: S, network: N, seeds: Arc<SeedSet>) -> Self {
        Self {
            storage,
            network,
            seeds,
        }
    }

    /// Fetch and store every seed, or fail without storing any of them.
    ///
    /// Running it again simply replaces each seed with its latest snapshot.
    pub async fn provision(&self) -> Result<(), WorkerError> {
        info!(cache = CACHE_NAME, count = self.seeds.urls().len(), "Seeding cache");
        let cache = self.storage.open(CACHE_NAME).await?;
        cache.add_all(&self.network, &self.seeds.requests()).await?;
        info!(cache = CACHE_NAME, "Cache seeded");
        Ok(())
    }
}
