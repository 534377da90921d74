//! Worker host lifecycle.
//!
//! The host owns the worker's state machine and delivers the three lifecycle
//! events to a `WorkerScript`:
//!
//! - install: the script registers work with `ExtendableEvent::wait_until`;
//!   the worker is installed only once all of it succeeds
//! - activate: same mechanism, after a successful install
//! - fetch: the script supplies the response with `FetchEvent::respond_with`
//!
//! Fetches are only intercepted once the worker is activated. Before that,
//! and whenever the script declines to respond, requests go straight to the
//! network.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::models::{Request, Response};
use crate::network::{FetchError, Network};

/// Number of install attempts before giving up.
pub const DEFAULT_INSTALL_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds between install attempts.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install or activation failed; the host may install again.
    Redundant,
}

impl WorkerState {
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Install/activate event. Completion of the lifecycle step waits on every
/// future handed to `wait_until`.
#[derive(Default)]
pub struct ExtendableEvent {
    pending: Vec<BoxFuture<'static, Result<(), WorkerError>>>,
}

impl ExtendableEvent {
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        self.pending.push(Box::pin(work));
    }

    async fn settle(self) -> Result<(), WorkerError> {
        try_join_all(self.pending).await.map(|_| ())
    }
}

/// An intercepted request waiting for the script to supply a response.
pub struct FetchEvent {
    request: Request,
    response: Option<BoxFuture<'static, Result<Response, FetchError>>>,
}

impl FetchEvent {
    fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Supply the response. Only the first call takes effect.
    pub fn respond_with<F>(&mut self, response: F)
    where
        F: Future<Output = Result<Response, FetchError>> + Send + 'static,
    {
        if self.response.is_some() {
            warn!(url = %self.request.url(), "respond_with called twice, ignoring");
            return;
        }
        self.response = Some(Box::pin(response));
    }
}

/// Event handlers of a worker.
pub trait WorkerScript: Send + Sync + 'static {
    fn on_install(&self, event: &mut ExtendableEvent);

    fn on_activate(&self, _event: &mut ExtendableEvent) {}

    fn on_fetch(&self, event: &mut FetchEvent);
}

/// Drives a `WorkerScript` through its lifecycle and dispatches fetches to it.
pub struct WorkerHost<W, N> {
    script: W,
    network: N,
    state: watch::Sender<WorkerState>,
}

impl<W: WorkerScript, N: Network> WorkerHost<W, N> {
    pub fn new(script: W, network: N) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            script,
            network,
            state,
        }
    }

    pub fn script(&self) -> &W {
        &self.script
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "Worker state changed");
    }

    fn expect_state(
        &self,
        allowed: &[WorkerState],
        expected: WorkerState,
    ) -> Result<(), WorkerError> {
        let actual = self.state();
        if allowed.contains(&actual) {
            Ok(())
        } else {
            Err(WorkerError::InvalidState { expected, actual })
        }
    }

    /// Run the install step. On failure the worker becomes redundant and may
    /// be installed again.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.expect_state(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Parsed)?;
        self.transition(WorkerState::Installing);

        let mut event = ExtendableEvent::default();
        self.script.on_install(&mut event);

        match event.settle().await {
            Ok(()) => {
                self.transition(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Install failed");
                self.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Install, retrying with exponential backoff.
    pub async fn install_with_retry(
        &self,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Result<(), WorkerError> {
        let max_attempts = max_attempts.max(1);
        let mut backoff = initial_backoff;
        let mut attempt = 1;

        loop {
            match self.install().await {
                Ok(()) => return Ok(()),
                Err(e @ WorkerError::InvalidState { .. }) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(WorkerError::InstallExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Install attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.expect_state(&[WorkerState::Installed], WorkerState::Installed)?;
        self.transition(WorkerState::Activating);

        let mut event = ExtendableEvent::default();
        self.script.on_activate(&mut event);

        match event.settle().await {
            Ok(()) => {
                self.transition(WorkerState::Activated);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Activation failed");
                self.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Deliver a fetch event and resolve it.
    pub async fn dispatch_fetch(&self, request: Request) -> Result<Response, FetchError> {
        let state = self.state();
        if !state.can_intercept_fetch() {
            debug!(%state, url = %request.url(), "Worker not active, passing through");
            return self.network.fetch(&request).await;
        }

        let mut event = FetchEvent::new(request);
        self.script.on_fetch(&mut event);

        match event.response {
            Some(response) => response.await,
            None => self.network.fetch(&event.request).await,
        }
    }
}
