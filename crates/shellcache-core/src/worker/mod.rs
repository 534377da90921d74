//! The request-interception worker.
//!
//! This module provides:
//! - `Provisioner`: seeds the named cache at install time
//! - `Interceptor`: classifies each request and routes it to a strategy
//!   (stale-while-revalidate, cache-first, invalidate-and-reseed)
//! - `WorkerHost`: the install/activate/fetch lifecycle
//! - `ShellWorker`: the worker script tying the above together

pub mod classify;
pub mod interceptor;
pub mod lifecycle;
pub mod provisioner;
pub mod seed;
pub mod shell;
mod strategy;

pub use classify::{RequestIntent, SessionAction};
pub use interceptor::{Interceptor, OrdinaryStrategy, RefreshOutcome};
pub use lifecycle::{
    ExtendableEvent, FetchEvent, WorkerHost, WorkerScript, WorkerState, DEFAULT_INSTALL_ATTEMPTS,
    INITIAL_BACKOFF_MS,
};
pub use provisioner::Provisioner;
pub use seed::{SeedSet, CACHE_NAME};
pub use shell::ShellWorker;
