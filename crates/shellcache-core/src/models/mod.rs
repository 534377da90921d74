//! Data models shared by the cache store, the network primitive and the worker.
//!
//! - `Request`, `RedirectMode`: an intercepted outgoing request
//! - `RequestIdentity`: the (method, URL) cache key
//! - `Response`: a buffered response snapshot
//! - `CachedData`: a value stamped with the time it was cached

pub mod cached;
pub mod request;
pub mod response;

pub use cached::CachedData;
pub use request::{RedirectMode, Request, RequestIdentity};
pub use response::Response;
