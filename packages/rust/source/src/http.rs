//! Shared HTTP plumbing for talking to the quiz site.

use std::time::Duration;

use reqwest::{Client, redirect};

use quizrelay_shared::{QuizRelayError, Result, SourceConfig};

/// Map a reqwest transport error, marking connect/timeout/reset failures transient.
pub fn request_error(url: &str, e: reqwest::Error) -> QuizRelayError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        QuizRelayError::transient(format!("{url}: {e}"))
    } else {
        QuizRelayError::network(format!("{url}: {e}"))
    }
}

/// Client with the site's user agent and timeout.
pub(crate) fn build_client(config: &SourceConfig, policy: redirect::Policy) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(policy)
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| QuizRelayError::network(format!("failed to build HTTP client: {e}")))
}

/// Whether `url` is the site's login page.
pub(crate) fn is_login_url(url: &url::Url, login_path: &str) -> bool {
    let login = login_path.trim_end_matches('/');
    !login.is_empty() && url.path().trim_end_matches('/').ends_with(login)
}
