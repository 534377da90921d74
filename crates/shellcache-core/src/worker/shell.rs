use std::sync::Arc;

use reqwest::Url;
use tokio::sync::mpsc;

use crate::cache::CacheStorage;
use crate::network::Network;

use super::interceptor::{Interceptor, OrdinaryStrategy, RefreshOutcome};
use super::lifecycle::{ExtendableEvent, FetchEvent, WorkerScript};
use super::provisioner::Provisioner;
use super::seed::SeedSet;

/// The offline shell worker: seeds the cache on install and intercepts every
/// fetch once active.
#[derive(Clone)]
pub struct ShellWorker<S, N> {
    provisioner: Provisioner<S, N>,
    interceptor: Interceptor<S, N>,
}

impl<S: CacheStorage, N: Network> ShellWorker<S, N> {
    pub fn new(storage: S, network: N, origin: &Url) -> Result<Self, url::ParseError> {
        let seeds = Arc::new(SeedSet::resolve(origin)?);
        Ok(Self {
            provisioner: Provisioner::new(storage.clone(), network.clone(), Arc::clone(&seeds)),
            interceptor: Interceptor::new(storage, network, seeds),
        })
    }

    pub fn with_strategy(mut self, strategy: OrdinaryStrategy) -> Self {
        self.interceptor = self.interceptor.with_strategy(strategy);
        self
    }

    pub fn with_refresh_reports(mut self, tx: mpsc::Sender<RefreshOutcome>) -> Self {
        self.interceptor = self.interceptor.with_refresh_reports(tx);
        self
    }

    pub fn provisioner(&self) -> &Provisioner<S, N> {
        &self.provisioner
    }

    pub fn interceptor(&self) -> &Interceptor<S, N> {
        &self.interceptor
    }
}

impl<S: CacheStorage, N: Network> WorkerScript for ShellWorker<S, N> {
    fn on_install(&self, event: &mut ExtendableEvent) {
        let provisioner = self.provisioner.clone();
        event.wait_until(async move { provisioner.provision().await });
    }

    fn on_fetch(&self, event: &mut FetchEvent) {
        let interceptor = self.interceptor.clone();
        let request = event.request().clone();
        event.respond_with(async move { interceptor.handle(request).await });
    }
}
