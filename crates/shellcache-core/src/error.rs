use reqwest::StatusCode;
use thiserror::Error;

use crate::cache::CacheError;
use crate::models::Response;
use crate::network::{truncate_body, FetchError};
use crate::worker::WorkerState;

/// Errors raised by the worker outside of the per-request fetch path:
/// seeding the cache and driving the lifecycle.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} responded with status {status}: {body}")]
    BadStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Worker is {actual}, expected {expected}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },

    #[error("Install failed after {attempts} attempts: {last}")]
    InstallExhausted {
        attempts: u32,
        #[source]
        last: Box<WorkerError>,
    },
}

impl WorkerError {
    pub fn bad_status(url: impl Into<String>, response: &Response) -> Self {
        WorkerError::BadStatus {
            url: url.into(),
            status: response.status(),
            body: truncate_body(&response.text()),
        }
    }
}
