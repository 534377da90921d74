//! HTTP implementation of the network fetch primitive.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client};
use tracing::debug;

use crate::models::{RedirectMode, Request, Response};

use super::{FetchError, Network};

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("shellcache/", env!("CARGO_PKG_VERSION"));

/// Network primitive backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    follow: Client,
    manual: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let follow = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let manual = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { follow, manual })
    }

    fn client_for(&self, mode: RedirectMode) -> &Client {
        match mode {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url();
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidRequest(format!("unsupported scheme in {}", url)));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                FetchError::InvalidRequest(format!("invalid header name {:?}", name))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                FetchError::InvalidRequest(format!("invalid value for header {}", name))
            })?;
            headers.append(name, value);
        }

        let mut builder = self
            .client_for(request.redirect())
            .request(request.method().clone(), url.clone())
            .headers(headers);
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                FetchError::Offline(request.url().to_string())
            } else {
                FetchError::Network(e)
            }
        })?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %request.method(),
            url = %request.url(),
            status = %status,
            bytes = body.len(),
            "Fetched"
        );

        Ok(Response::new(status, body).with_headers(headers).with_url(url))
    }
}
