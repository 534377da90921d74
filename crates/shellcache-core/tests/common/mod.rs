//! Shared test doubles: a scripted network and a cache storage that records
//! every operation into the same ordered log.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use shellcache_core::cache::MemoryCache;
use shellcache_core::worker::CACHE_NAME;
use shellcache_core::{
    Cache, CacheError, CacheStorage, CachedData, FetchError, MemoryStorage, Network, Request,
    RequestIdentity, Response,
};

pub const ORIGIN: &str = "http://ledger.test/";

pub fn origin() -> Url {
    Url::parse(ORIGIN).expect("origin")
}

pub fn url(path: &str) -> Url {
    origin().join(path).expect("test url")
}

pub fn get(path: &str) -> Request {
    Request::get(url(path))
}

pub fn identity(path: &str) -> RequestIdentity {
    RequestIdentity::get(&url(path))
}

fn path_of(raw: &str) -> String {
    Url::parse(raw)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Ordered log of network and cache operations.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().expect("log lock").push(event);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("log lock").clone()
    }

    pub fn clear(&self) {
        self.0.lock().expect("log lock").clear();
    }
}

enum Reply {
    Respond(Response),
    Fail,
}

struct Route {
    reply: Reply,
    delay: Duration,
    failures_remaining: usize,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub cookie: Option<String>,
}

/// Network double answering from a per-(method, path) script. Unscripted
/// requests get a 404.
#[derive(Clone, Default)]
pub struct ScriptedNetwork {
    routes: Arc<Mutex<HashMap<(Method, String), Route>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    log: EventLog,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn set(&self, method: Method, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().expect("routes lock");
        let route = routes.entry((method, path.to_string())).or_insert(Route {
            reply: Reply::Fail,
            delay: Duration::ZERO,
            failures_remaining: 0,
        });
        route.reply = reply;
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).expect("status");
        self.respond_with(method, path, Response::new(status, body));
    }

    pub fn respond_with(&self, method: Method, path: &str, response: Response) {
        self.set(method, path, Reply::Respond(response));
    }

    pub fn fail(&self, method: Method, path: &str) {
        self.set(method, path, Reply::Fail);
    }

    /// Fail the next `times` requests, then answer as scripted.
    pub fn fail_times(&self, method: Method, path: &str, times: usize) {
        let mut routes = self.routes.lock().expect("routes lock");
        if let Some(route) = routes.get_mut(&(method, path.to_string())) {
            route.failures_remaining = times;
        }
    }

    pub fn delay(&self, method: Method, path: &str, delay: Duration) {
        let mut routes = self.routes.lock().expect("routes lock");
        if let Some(route) = routes.get_mut(&(method, path.to_string())) {
            route.delay = delay;
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = request.method().clone();
        let path = request.url().path().to_string();
        self.calls.lock().expect("calls lock").push(RecordedCall {
            method: method.clone(),
            path: path.clone(),
            cookie: request.header("cookie").map(str::to_string),
        });
        self.log.push(format!("fetch {} {}", method, path));

        let (reply, delay) = {
            let mut routes = self.routes.lock().expect("routes lock");
            match routes.get_mut(&(method, path)) {
                Some(route) => {
                    let reply = if route.failures_remaining > 0 {
                        route.failures_remaining -= 1;
                        None
                    } else {
                        match &route.reply {
                            Reply::Respond(response) => Some(response.clone()),
                            Reply::Fail => None,
                        }
                    };
                    (reply, route.delay)
                }
                None => (Some(Response::new(StatusCode::NOT_FOUND, "not found")), Duration::ZERO),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
            .map(|r| r.with_url(request.url().clone()))
            .ok_or_else(|| FetchError::Offline(request.url().to_string()))
    }
}

/// Memory storage that logs every operation and can be made unavailable.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    inner: MemoryStorage,
    log: EventLog,
    unavailable: Arc<AtomicBool>,
}

impl RecordingStorage {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Read an entry without logging.
    pub async fn peek(&self, path: &str) -> Option<String> {
        let cache = self.inner.open(CACHE_NAME).await.expect("open");
        cache
            .match_request(&identity(path))
            .await
            .expect("match")
            .map(|r| r.text())
    }

    /// Write an entry without logging.
    pub async fn preload(&self, path: &str, body: &str) {
        let cache = self.inner.open(CACHE_NAME).await.expect("open");
        cache
            .put(identity(path), Response::ok(body))
            .await
            .expect("put");
    }

    pub async fn cached_paths(&self) -> Vec<String> {
        let cache = self.inner.open(CACHE_NAME).await.expect("open");
        let mut paths: Vec<String> = cache
            .keys()
            .await
            .expect("keys")
            .into_iter()
            .map(|k| path_of(&k.data.url))
            .collect();
        paths.sort();
        paths
    }
}

#[derive(Clone)]
pub struct RecordingCache {
    inner: MemoryCache,
    log: EventLog,
}

impl CacheStorage for RecordingStorage {
    type Cache = RecordingCache;

    async fn open(&self, name: &str) -> Result<RecordingCache, CacheError> {
        self.log.push(format!("open {}", name));
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::other("cache offline")));
        }
        Ok(RecordingCache {
            inner: self.inner.open(name).await?,
            log: self.log.clone(),
        })
    }
}

impl Cache for RecordingCache {
    async fn match_request(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Option<Response>, CacheError> {
        self.log.push(format!("match {}", path_of(&identity.url)));
        self.inner.match_request(identity).await
    }

    async fn put(&self, identity: RequestIdentity, response: Response) -> Result<(), CacheError> {
        self.log.push(format!("put {}", path_of(&identity.url)));
        self.inner.put(identity, response).await
    }

    async fn put_all(&self, entries: Vec<(RequestIdentity, Response)>) -> Result<(), CacheError> {
        for (identity, _) in &entries {
            self.log.push(format!("put {}", path_of(&identity.url)));
        }
        self.inner.put_all(entries).await
    }

    async fn keys(&self) -> Result<Vec<CachedData<RequestIdentity>>, CacheError> {
        self.inner.keys().await
    }
}

/// Script the three seed resources.
pub fn script_seeds(network: &ScriptedNetwork, root: &str, shell: &str, stylesheet: &str) {
    network.respond(Method::GET, "/", 200, root);
    network.respond(Method::GET, "/ledger/ui/", 200, shell);
    network.respond(Method::GET, "/static/style.css", 200, stylesheet);
}
