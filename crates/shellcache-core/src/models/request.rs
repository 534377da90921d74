use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use super::Response;

/// How the network primitive treats redirect responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    /// Follow redirects and return the final response (seed and reseed fetches).
    #[default]
    Follow,
    /// Hand the redirect back untouched so the client can follow it.
    Manual,
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    redirect: RedirectMode,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Vec::new(),
            redirect: RedirectMode::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn redirect(&self) -> RedirectMode {
        self.redirect
    }

    /// Build a GET for `url` that carries this request's credentials.
    ///
    /// Cookies set by `response` replace same-named cookies from the original
    /// request, so a fetch issued right after a login or logout sees the new
    /// session rather than the old one.
    pub fn follow_up(&self, url: Url, response: &Response) -> Self {
        let mut cookies = self.header("cookie").map(parse_cookie_header).unwrap_or_default();

        for set_cookie in response.headers_named("set-cookie") {
            if let Some((name, value)) = parse_set_cookie(set_cookie) {
                match cookies.iter_mut().find(|(n, _)| *n == name) {
                    Some(existing) => existing.1 = value,
                    None => cookies.push((name, value)),
                }
            }
        }

        let mut request = Request::get(url);
        if !cookies.is_empty() {
            let joined = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.with_header("cookie", joined);
        }
        if let Some(auth) = self.header("authorization") {
            request = request.with_header("authorization", auth);
        }
        request
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Cache key: the (method, URL) pair of a GET request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
}

impl RequestIdentity {
    /// Identity of a request, or `None` when the request can never be a cache key.
    pub fn of(request: &Request) -> Option<Self> {
        if request.method() != Method::GET {
            return None;
        }
        Some(Self::get(request.url()))
    }

    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET.to_string(),
            url: url.to_string(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
