use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheStorage};
use crate::error::WorkerError;
use crate::models::{Request, RequestIdentity, Response};
use crate::network::{FetchError, Network};

use super::classify::SessionAction;
use super::interceptor::{Interceptor, RefreshOutcome};
use super::seed::CACHE_NAME;

impl<S: CacheStorage, N: Network> Interceptor<S, N> {
    /// Cache hit, else network. Nothing is written.
    pub(super) async fn cache_first(&self, request: Request) -> Result<Response, FetchError> {
        if let Some(identity) = RequestIdentity::of(&request) {
            if let Some(hit) = self.lookup(&identity).await {
                debug!(%identity, "Cache hit");
                return Ok(hit);
            }
        }
        self.network.fetch(&request).await
    }

    /// Serve the cached snapshot at once and refresh it in a detached task.
    ///
    /// A miss goes to the network and is not written back; only seeding and
    /// reseeding create entries.
    pub(super) async fn stale_while_revalidate(
        &self,
        request: Request,
    ) -> Result<Response, FetchError> {
        let Some(identity) = RequestIdentity::of(&request) else {
            return self.network.fetch(&request).await;
        };

        match self.lookup(&identity).await {
            Some(hit) => {
                debug!(%identity, "Cache hit, revalidating in background");
                self.spawn_revalidate(identity, request);
                Ok(hit)
            }
            None => {
                debug!(%identity, "Cache miss");
                self.network.fetch(&request).await
            }
        }
    }

    /// The refresh is not tied to the client: it runs to completion even if
    /// the caller drops the response future.
    fn spawn_revalidate(&self, identity: RequestIdentity, request: Request) {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.revalidate(identity, request).await;
            this.report(outcome).await;
        });
    }

    async fn revalidate(&self, identity: RequestIdentity, request: Request) -> RefreshOutcome {
        let fresh = match self.network.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%identity, error = %e, "Background refresh failed, keeping cached copy");
                return RefreshOutcome::Failed {
                    identity,
                    error: e.to_string(),
                };
            }
        };

        if !fresh.is_cacheable() {
            warn!(
                %identity,
                status = %fresh.status(),
                "Background refresh returned an uncacheable status, keeping cached copy"
            );
            return RefreshOutcome::Rejected {
                identity,
                status: fresh.status(),
            };
        }

        let stored = match self.storage.open(CACHE_NAME).await {
            Ok(cache) => cache.put(identity.clone(), fresh).await,
            Err(e) => Err(e),
        };
        match stored {
            Ok(()) => {
                debug!(%identity, "Cache entry refreshed");
                RefreshOutcome::Updated { identity }
            }
            Err(e) => {
                warn!(%identity, error = %e, "Could not store refreshed response");
                RefreshOutcome::CacheUnavailable {
                    identity,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Network first, then reseed the session-dependent entries before the
    /// response is released to the client.
    ///
    /// The cache is never read here. A network failure propagates unchanged.
    /// A 4xx/5xx answer means the session did not change, so nothing is
    /// reseeded. Reseed failures are logged and do not affect the response.
    pub(super) async fn invalidate_and_reseed(
        &self,
        action: SessionAction,
        request: Request,
    ) -> Result<Response, FetchError> {
        let response = self.network.fetch(&request).await?;

        if response.is_error_status() {
            debug!(
                ?action,
                status = %response.status(),
                "Session request rejected, cache left as is"
            );
            return Ok(response);
        }

        match self.reseed(&request, &response).await {
            Ok(refreshed) => info!(?action, refreshed, "Reseeded session-dependent entries"),
            Err(e) => warn!(?action, error = %e, "Reseed failed, serving session response anyway"),
        }
        Ok(response)
    }

    /// Re-fetch and store each session-dependent seed. Each entry is refreshed
    /// independently; returns how many were written.
    async fn reseed(
        &self,
        origin: &Request,
        session_response: &Response,
    ) -> Result<usize, WorkerError> {
        let cache = self.storage.open(CACHE_NAME).await?;

        let refreshes = self.seeds.session_dependent().iter().map(|url| {
            let request = origin.follow_up(url.clone(), session_response);
            let cache = cache.clone();
            async move {
                let fresh = self
                    .network
                    .fetch(&request)
                    .await
                    .map_err(|source| WorkerError::Fetch {
                        url: url.to_string(),
                        source,
                    })?;
                if !fresh.is_cacheable() {
                    return Err(WorkerError::bad_status(url.as_str(), &fresh));
                }
                cache.put(RequestIdentity::get(url), fresh).await?;
                Ok::<_, WorkerError>(())
            }
        });

        let mut refreshed = 0;
        let mut last_error = None;
        for result in join_all(refreshes).await {
            match result {
                Ok(()) => refreshed += 1,
                Err(e) => {
                    warn!(error = %e, "Could not reseed entry");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if refreshed == 0 => Err(e),
            _ => Ok(refreshed),
        }
    }
}
