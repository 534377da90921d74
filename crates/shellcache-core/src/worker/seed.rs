use reqwest::Url;

use crate::models::Request;

/// Name of the single cache generation.
pub const CACHE_NAME: &str = "v1";

pub const ROOT_PATH: &str = "/";
pub const SHELL_PATH: &str = "/ledger/ui/";
pub const STYLESHEET_PATH: &str = "/static/style.css";

/// Resources that must resolve even without network access, in seeding order.
pub const SEED_PATHS: [&str; 3] = [ROOT_PATH, SHELL_PATH, STYLESHEET_PATH];

/// Seed entries whose content depends on who is logged in.
pub const SESSION_DEPENDENT_PATHS: [&str; 2] = [ROOT_PATH, SHELL_PATH];

pub const LOGIN_PATH: &str = "/accounts/login/";
pub const LOGOUT_PATH: &str = "/accounts/logout/";

/// The seed paths resolved against an origin.
#[derive(Debug, Clone)]
pub struct SeedSet {
    all: Vec<Url>,
    session_dependent: Vec<Url>,
}

impl SeedSet {
    pub fn resolve(origin: &Url) -> Result<Self, url::ParseError> {
        let resolve = |paths: &[&str]| -> Result<Vec<Url>, url::ParseError> {
            paths.iter().map(|path| origin.join(path)).collect()
        };
        Ok(Self {
            all: resolve(&SEED_PATHS[..])?,
            session_dependent: resolve(&SESSION_DEPENDENT_PATHS[..])?,
        })
    }

    pub fn urls(&self) -> &[Url] {
        &self.all
    }

    pub fn session_dependent(&self) -> &[Url] {
        &self.session_dependent
    }

    pub fn requests(&self) -> Vec<Request> {
        self.all.iter().cloned().map(Request::get).collect()
    }
}
