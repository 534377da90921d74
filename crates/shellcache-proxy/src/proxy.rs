//! HTTP front-end that turns every incoming request into a worker fetch event.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use shellcache_core::{
    FetchError, Network, RedirectMode, Request, Response, WorkerHost, WorkerScript,
};
use tracing::{debug, warn};
use url::Url;

/// Connection-scoped headers that never cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers recomputed on each side of the proxy.
fn is_framing(name: &str) -> bool {
    name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length")
}

pub struct ProxyState<W, N> {
    host: Arc<WorkerHost<W, N>>,
    origin: Url,
    max_body_bytes: usize,
}

impl<W, N> Clone for ProxyState<W, N> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            origin: self.origin.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl<W: WorkerScript, N: Network> ProxyState<W, N> {
    pub fn new(host: Arc<WorkerHost<W, N>>, origin: Url, max_body_bytes: usize) -> Self {
        Self {
            host,
            origin,
            max_body_bytes,
        }
    }

    async fn to_fetch_request(
        &self,
        request: axum::extract::Request,
    ) -> Result<Request, axum::response::Response> {
        let (parts, body) = request.into_parts();
        let url = resolve_target(&self.origin, &parts.uri);

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                let message = format!("Request body rejected: {}", e);
                (StatusCode::PAYLOAD_TOO_LARGE, message).into_response()
            })?;

        let mut fetch = Request::new(parts.method, url)
            .with_body(body.to_vec())
            .with_redirect(RedirectMode::Manual);
        for (name, value) in copy_headers(&parts.headers) {
            fetch = fetch.with_header(name, value);
        }
        Ok(fetch)
    }
}

/// The origin URL with the request's path and query. Scheme and authority
/// always come from the origin, whatever form the request target takes.
fn resolve_target(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

fn copy_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && !is_framing(name.as_str()))
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.as_str().to_string(), value.to_string())),
            Err(_) => {
                debug!(header = %name, "Dropping non-UTF-8 header");
                None
            }
        })
        .collect()
}

fn into_http_response(response: Response) -> axum::response::Response {
    let status = response.status();
    let headers = response.headers().to_vec();

    let mut out = axum::response::Response::new(Body::from(response.into_body()));
    *out.status_mut() = status;
    for (name, value) in headers {
        if is_hop_by_hop(&name) || is_framing(&name) {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => debug!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}

fn bad_gateway(error: &FetchError) -> axum::response::Response {
    (StatusCode::BAD_GATEWAY, format!("Upstream fetch failed: {}", error)).into_response()
}

async fn relay<W: WorkerScript, N: Network>(
    State(state): State<ProxyState<W, N>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let request = match state.to_fetch_request(request).await {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let method = request.method().clone();
    let url = request.url().clone();

    match state.host.dispatch_fetch(request).await {
        Ok(response) => {
            debug!(%method, %url, status = %response.status(), "Relayed");
            into_http_response(response)
        }
        Err(e) => {
            warn!(%method, %url, error = %e, "Fetch failed");
            bad_gateway(&e)
        }
    }
}

/// Every path is handed to the worker.
pub fn router<W: WorkerScript, N: Network>(state: ProxyState<W, N>) -> Router {
    Router::new().fallback(relay::<W, N>).with_state(state)
}
