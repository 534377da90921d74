//! shellcache - serves a web app through an offline-capable interception cache.
//!
//! The binary plays host to the shellcache worker: it installs the worker
//! (seeding the cache), activates it, and relays every local HTTP request
//! through it to the configured origin.

mod proxy;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shellcache_core::worker::{CACHE_NAME, INITIAL_BACKOFF_MS};
use shellcache_core::{
    Cache, CacheBackend, CacheStorage, Config, DiskStorage, HttpNetwork, MemoryStorage,
    ShellWorker, WorkerHost,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use proxy::{router, ProxyState};

/// Prefix for daily log files under `log_dir`.
const LOG_FILE_PREFIX: &str = "shellcache.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Seed,
    ListCache,
}

impl Command {
    fn from_args(args: &[String]) -> Result<Self> {
        match args.get(1).map(String::as_str) {
            None => Ok(Command::Serve),
            Some("--seed") => Ok(Command::Seed),
            Some("--list-cache") => Ok(Command::ListCache),
            Some(other) => {
                anyhow::bail!("Unknown argument: {} (expected --seed or --list-cache)", other)
            }
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=shellcache_core=debug).
/// The returned guard must live until exit so buffered file output is flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().collect();
    let command = Command::from_args(&args)?;

    match config.cache_backend {
        CacheBackend::Disk => {
            let dir = config.cache_dir()?;
            info!(dir = %dir.display(), "Using disk cache");
            run(&config, DiskStorage::new(dir), command).await
        }
        CacheBackend::Memory => {
            info!("Using in-memory cache");
            run(&config, MemoryStorage::new(), command).await
        }
    }
}

async fn run<S: CacheStorage>(config: &Config, storage: S, command: Command) -> Result<()> {
    if command == Command::ListCache {
        return list_cache(&storage).await;
    }

    let origin = config.origin_url()?;
    let network = HttpNetwork::with_timeout(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let worker = ShellWorker::new(storage, network.clone(), &origin)
        .context("Failed to resolve seed URLs")?
        .with_strategy(config.ordinary_strategy);
    let host = Arc::new(WorkerHost::new(worker, network));

    info!(%origin, "Installing worker");
    host.install_with_retry(config.install_attempts, Duration::from_millis(INITIAL_BACKOFF_MS))
        .await
        .context("Failed to seed the cache")?;

    if command == Command::Seed {
        eprintln!("Cache seeded from {}", origin);
        return Ok(());
    }

    host.activate().await.context("Failed to activate worker")?;

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(
        listen = %config.listen,
        %origin,
        strategy = ?config.ordinary_strategy,
        "shellcache serving"
    );

    let app = router(ProxyState::new(host, origin, config.max_body_bytes));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("shellcache shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Print every cached identity with its age.
async fn list_cache<S: CacheStorage>(storage: &S) -> Result<()> {
    let cache = storage.open(CACHE_NAME).await.context("Failed to open cache")?;
    let mut entries = cache.keys().await.context("Failed to list cache")?;
    entries.sort_by(|a, b| a.data.url.cmp(&b.data.url));

    if entries.is_empty() {
        eprintln!("Cache {} is empty", CACHE_NAME);
        return Ok(());
    }
    for entry in entries {
        println!("{:<8} {:<60} {}", entry.data.method, entry.data.url, entry.age_display());
    }
    Ok(())
}
