//! Per-request routing.
//!
//! Every intercepted request is classified and handed to exactly one strategy:
//! session-boundary requests go through invalidate-and-reseed, everything
//! else through the configured ordinary strategy. The strategies themselves
//! live in `strategy.rs`.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheStorage};
use crate::models::{Request, RequestIdentity, Response};
use crate::network::{FetchError, Network};

use super::classify::RequestIntent;
use super::seed::{SeedSet, CACHE_NAME};

/// Strategy for requests that are not session boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrdinaryStrategy {
    /// Serve the cached copy, refresh it in the background.
    #[default]
    StaleWhileRevalidate,
    /// Serve the cached copy, else the network. Never writes.
    CacheFirst,
}

/// How a detached background refresh ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache entry now holds the fresh snapshot.
    Updated { identity: RequestIdentity },
    /// The network answered with an uncacheable status (non-2xx or 206); the
    /// entry is untouched.
    Rejected {
        identity: RequestIdentity,
        status: StatusCode,
    },
    /// The network fetch failed; the entry is untouched.
    Failed {
        identity: RequestIdentity,
        error: String,
    },
    /// The fresh snapshot could not be written.
    CacheUnavailable {
        identity: RequestIdentity,
        error: String,
    },
}

impl RefreshOutcome {
    pub fn identity(&self) -> &RequestIdentity {
        match self {
            RefreshOutcome::Updated { identity }
            | RefreshOutcome::Rejected { identity, .. }
            | RefreshOutcome::Failed { identity, .. }
            | RefreshOutcome::CacheUnavailable { identity, .. } => identity,
        }
    }
}

/// Routes intercepted requests among the caching strategies.
/// Clone is cheap - storage and network handles share their state.
#[derive(Clone)]
pub struct Interceptor<S, N> {
    pub(super) storage: S,
    pub(super) network: N,
    pub(super) seeds: Arc<SeedSet>,
    ordinary: OrdinaryStrategy,
    refresh_tx: Option<mpsc::Sender<RefreshOutcome>>,
}

impl<S: CacheStorage, N: Network> Interceptor<S, N> {
    pub fn new(storage: S, network: N, seeds: Arc<SeedSet>) -> Self {
        Self {
            storage,
            network,
            seeds,
            ordinary: OrdinaryStrategy::default(),
            refresh_tx: None,
        }
    }

    pub fn with_strategy(mut self, strategy: OrdinaryStrategy) -> Self {
        self.ordinary = strategy;
        self
    }

    /// Report the outcome of every background refresh on `tx`.
    pub fn with_refresh_reports(mut self, tx: mpsc::Sender<RefreshOutcome>) -> Self {
        self.refresh_tx = Some(tx);
        self
    }

    pub fn strategy(&self) -> OrdinaryStrategy {
        self.ordinary
    }

    /// Resolve an intercepted request.
    ///
    /// Fails only when the request needed the network (cache miss or session
    /// boundary) and the network failed.
    pub async fn handle(&self, request: Request) -> Result<Response, FetchError> {
        let intent = RequestIntent::classify(&request);
        debug!(method = %request.method(), url = %request.url(), ?intent, "Intercepted request");

        match intent {
            RequestIntent::SessionBoundary(action) => {
                self.invalidate_and_reseed(action, request).await
            }
            RequestIntent::Ordinary => match self.ordinary {
                OrdinaryStrategy::StaleWhileRevalidate => {
                    self.stale_while_revalidate(request).await
                }
                OrdinaryStrategy::CacheFirst => self.cache_first(request).await,
            },
        }
    }

    /// Look up a snapshot, treating an unavailable cache as a miss.
    pub(super) async fn lookup(&self, identity: &RequestIdentity) -> Option<Response> {
        let cache = match self.storage.open(CACHE_NAME).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(%identity, error = %e, "Cache unavailable, falling back to network");
                return None;
            }
        };
        match cache.match_request(identity).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%identity, error = %e, "Cache read failed, falling back to network");
                None
            }
        }
    }

    /// Helper to send refresh outcomes, logging any channel errors
    pub(super) async fn report(&self, outcome: RefreshOutcome) {
        if let Some(ref tx) = self.refresh_tx {
            if let Err(e) = tx.send(outcome).await {
                debug!(error = %e, "Refresh outcome dropped - receiver closed");
            }
        }
    }
}
