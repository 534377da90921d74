//! Network fetch primitive.
//!
//! `Network` is the seam between the worker and the outside world: it turns a
//! `Request` into a buffered `Response`, or fails with a `FetchError` when no
//! response could be obtained at all. `HttpNetwork` is the reqwest-backed
//! implementation used by the proxy; tests substitute scripted fakes.

use std::future::Future;

use crate::models::{Request, Response};

pub mod client;
pub mod error;

pub use client::HttpNetwork;
pub use error::{truncate_body, FetchError};

/// Implementations should ensure that cloning is cheap and clones share the
/// same underlying connection state.
pub trait Network: Clone + Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}
