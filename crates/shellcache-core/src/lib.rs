//! Core library for shellcache.
//!
//! A client-side request-interception cache: a worker that sits between a web
//! client and the network and decides per request whether to serve from a
//! local cache, fetch fresh, or both.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod worker;

pub use cache::{Cache, CacheError, CacheStorage, DiskStorage, MemoryStorage};
pub use config::{CacheBackend, Config};
pub use error::WorkerError;
pub use models::{CachedData, RedirectMode, Request, RequestIdentity, Response};
pub use network::{FetchError, HttpNetwork, Network};
pub use worker::{
    Interceptor, OrdinaryStrategy, RefreshOutcome, ShellWorker, WorkerHost, WorkerScript,
    WorkerState,
};
