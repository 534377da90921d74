use reqwest::Method;

use crate::models::Request;

use super::seed::{LOGIN_PATH, LOGOUT_PATH};

/// A request that changes server-side authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Login,
    Logout,
}

/// What an intercepted request is for. Recomputed for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIntent {
    SessionBoundary(SessionAction),
    Ordinary,
}

impl RequestIntent {
    /// Classify by URL path suffix and method.
    ///
    /// Any request to the logout path ends the session. Only a POST to the
    /// login path starts one; fetching the login form is ordinary.
    pub fn classify(request: &Request) -> Self {
        let path = request.url().path();
        if path.ends_with(LOGOUT_PATH) {
            RequestIntent::SessionBoundary(SessionAction::Logout)
        } else if path.ends_with(LOGIN_PATH) && request.method() == Method::POST {
            RequestIntent::SessionBoundary(SessionAction::Login)
        } else {
            RequestIntent::Ordinary
        }
    }

    pub fn is_session_boundary(&self) -> bool {
        matches!(self, RequestIntent::SessionBoundary(_))
    }
}
