//! Session lifecycle: restore a stored session, probe it, log in when needed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, LOCATION, REFERER};
use reqwest::{Client, redirect};
use tracing::{debug, info, instrument, warn};
use url::Url;

use quizrelay_shared::{Credentials, QuizRelayError, Result, SessionArtifact, SourceConfig};
use quizrelay_storage::SessionStore;

use crate::http::{build_client, is_login_url, request_error};

/// Obtains a working session, reusing the stored one whenever it still works.
pub struct SessionManager {
    config: SourceConfig,
    store: SessionStore,
    credentials: Option<Credentials>,
    /// Does not follow redirects, so a bounce to the login page is visible.
    probe_client: Client,
    probe_url: Url,
    login_url: Url,
}

impl SessionManager {
    pub fn new(
        config: &SourceConfig,
        store: SessionStore,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        Ok(Self {
            probe_client: build_client(config, redirect::Policy::none())?,
            probe_url: config.url(&config.probe_path)?,
            login_url: config.url(&config.login_path)?,
            config: config.clone(),
            store,
            credentials,
        })
    }

    /// Restore, validate, and only log in when that fails.
    ///
    /// A failed login is fatal for the run: no item work without a session.
    #[instrument(skip_all)]
    pub async fn acquire(&self) -> Result<SessionArtifact> {
        if let Some(artifact) = self.restore().await {
            if self.validate(&artifact).await {
                info!("reusing stored session");
                return Ok(artifact);
            }
            info!("stored session is no longer valid, logging in");
        }

        let credentials = self.credentials.as_ref().ok_or_else(|| {
            QuizRelayError::Auth("no usable stored session and login credentials are not set".into())
        })?;
        let artifact = self.refresh(credentials).await?;
        self.persist(&artifact).await;
        Ok(artifact)
    }

    pub async fn restore(&self) -> Option<SessionArtifact> {
        self.store.restore().await
    }

    /// Cheap authenticated request: a redirect to the login page means the
    /// session is gone. Network failures also count as invalid.
    #[instrument(skip_all, fields(url = %self.probe_url))]
    pub async fn validate(&self, artifact: &SessionArtifact) -> bool {
        let response = match self
            .probe_client
            .get(self.probe_url.as_str())
            .header(COOKIE, artifact.cookie_header())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "session probe failed");
                return false;
            }
        };

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| self.probe_url.join(loc).ok());
            let to_login = location
                .as_ref()
                .is_some_and(|u| is_login_url(u, &self.config.login_path));
            debug!(status = status.as_u16(), to_login, "probe redirected");
            return !to_login;
        }

        debug!(status = status.as_u16(), "probe answered");
        status.is_success()
    }

    /// Full login with the site's form.
    #[instrument(skip_all, fields(url = %self.login_url))]
    pub async fn refresh(&self, credentials: &Credentials) -> Result<SessionArtifact> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::limited(10))
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| QuizRelayError::network(format!("failed to build HTTP client: {e}")))?;

        // Visit the login page first so the site sets its pre-login cookies.
        client
            .get(self.login_url.as_str())
            .send()
            .await
            .map_err(|e| request_error(self.login_url.as_str(), e))?;

        let form = [
            ("emailId", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
            ("submit", "Sign in"),
        ];
        let response = client
            .post(self.login_url.as_str())
            .header(REFERER, self.login_url.as_str())
            .header("Origin", self.login_url.origin().ascii_serialization())
            .form(&form)
            .send()
            .await
            .map_err(|e| request_error(self.login_url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizRelayError::Auth(format!(
                "login failed with status {status}"
            )));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(self.login_url.as_str(), e))?;
        if is_login_url(&final_url, &self.config.login_path) && body.to_lowercase().contains("error") {
            return Err(QuizRelayError::Auth(
                "login rejected: invalid credentials".into(),
            ));
        }

        let cookies = self.session_cookies(&jar);
        if cookies.is_empty() {
            return Err(QuizRelayError::Auth(
                "login returned no session cookies".into(),
            ));
        }

        info!(cookies = cookies.len(), "logged in");
        Ok(SessionArtifact::new(cookies))
    }

    /// Save the session; failures are logged, the run continues.
    pub async fn persist(&self, artifact: &SessionArtifact) {
        if let Err(e) = self.store.persist(artifact).await {
            warn!(error = %e, "failed to persist session");
        }
    }

    /// Mark the session unusable after the site rejected it mid-run.
    pub async fn invalidate(&self, artifact: &SessionArtifact) {
        if let Err(e) = self.store.invalidate(artifact).await {
            warn!(error = %e, "failed to persist invalidated session");
        }
    }

    pub async fn flush(&self, timeout: Duration) -> bool {
        self.store.flush(timeout).await
    }

    /// The configured session cookies held by `jar` for the site.
    fn session_cookies(&self, jar: &Jar) -> BTreeMap<String, String> {
        let Some(header) = jar.cookies(&self.login_url) else {
            return BTreeMap::new();
        };
        let Ok(header) = header.to_str() else {
            return BTreeMap::new();
        };

        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| self.config.session_cookies.iter().any(|c| c == name))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizrelay_storage::{FallbackBackend, LocalFileBackend};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        server: MockServer,
        dir: std::path::PathBuf,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                server: MockServer::start().await,
                dir: std::env::temp_dir().join(format!("qr_session_{}", uuid::Uuid::now_v7())),
            }
        }

        fn store(&self) -> SessionStore {
            let local = LocalFileBackend::new(self.dir.join("session.json"));
            SessionStore::new(Box::new(FallbackBackend::local_only(Box::new(local))))
        }

        fn manager(&self, credentials: Option<Credentials>) -> SessionManager {
            let config = SourceConfig {
                base_url: self.server.uri(),
                timeout_secs: 5,
                ..SourceConfig::default()
            };
            SessionManager::new(&config, self.store(), credentials).expect("manager")
        }

        async fn mount_login(&self) {
            Mock::given(method("GET"))
                .and(path("/login"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Set-Cookie", "PHPSESSID=fresh; Path=/")
                        .set_body_string("<form>Sign in</form>"),
                )
                .mount(&self.server)
                .await;
            Mock::given(method("POST"))
                .and(path("/login"))
                .and(body_string_contains("emailId=me%40example.com"))
                .and(body_string_contains("submit=Sign+in"))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("Location", "/dashboard")
                        .insert_header("Set-Cookie", "pendulum_session=s3ss; Path=/"),
                )
                .mount(&self.server)
                .await;
            Mock::given(method("GET"))
                .and(path("/dashboard"))
                .respond_with(ResponseTemplate::new(200).set_body_string("Welcome"))
                .mount(&self.server)
                .await;
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "me@example.com".into(),
            password: "hunter2".into(),
        }
    }

    fn stored() -> SessionArtifact {
        let mut cookies = BTreeMap::new();
        cookies.insert("PHPSESSID".to_string(), "old".to_string());
        SessionArtifact::new(cookies)
    }

    #[tokio::test]
    async fn login_captures_session_cookies() {
        let fx = Fixture::new().await;
        fx.mount_login().await;

        let artifact = fx.manager(None).refresh(&credentials()).await.expect("login");
        assert_eq!(artifact.cookies.get("PHPSESSID").map(String::as_str), Some("fresh"));
        assert_eq!(artifact.cookies.get("pendulum_session").map(String::as_str), Some("s3ss"));
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let fx = Fixture::new().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&fx.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Error: wrong password"))
            .mount(&fx.server)
            .await;

        let err = fx.manager(None).refresh(&credentials()).await.unwrap_err();
        assert!(matches!(err, QuizRelayError::Auth(_)));
    }

    #[tokio::test]
    async fn probe_redirect_to_login_is_invalid() {
        let fx = Fixture::new().await;
        Mock::given(method("GET"))
            .and(path("/quiz/current-affairs"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
            .mount(&fx.server)
            .await;

        assert!(!fx.manager(None).validate(&stored()).await);
    }

    #[tokio::test]
    async fn acquire_reuses_valid_stored_session() {
        let fx = Fixture::new().await;
        fx.store().persist(&stored()).await.expect("seed");
        Mock::given(method("GET"))
            .and(path("/quiz/current-affairs"))
            .and(header("cookie", "PHPSESSID=old"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&fx.server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fx.server)
            .await;

        let artifact = fx.manager(None).acquire().await.expect("acquire");
        assert_eq!(artifact.cookie_header(), "PHPSESSID=old");
    }

    #[tokio::test]
    async fn acquire_logs_in_when_stored_session_is_stale() {
        let fx = Fixture::new().await;
        fx.store().persist(&stored()).await.expect("seed");
        Mock::given(method("GET"))
            .and(path("/quiz/current-affairs"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
            .mount(&fx.server)
            .await;
        fx.mount_login().await;

        let artifact = fx.manager(Some(credentials())).acquire().await.expect("acquire");
        assert!(artifact.cookies.contains_key("pendulum_session"));

        // The fresh session replaced the stale one on disk.
        let restored = fx.store().restore().await.expect("persisted");
        assert_eq!(restored.cookies, artifact.cookies);
    }

    #[tokio::test]
    async fn acquire_without_session_or_credentials_fails() {
        let fx = Fixture::new().await;
        let err = fx.manager(None).acquire().await.unwrap_err();
        assert!(matches!(err, QuizRelayError::Auth(_)));
    }

    #[tokio::test]
    async fn invalidate_forces_login_next_time() {
        let fx = Fixture::new().await;
        let manager = fx.manager(None);
        manager.persist(&stored()).await;
        assert!(manager.restore().await.is_some());

        manager.invalidate(&stored()).await;
        assert!(manager.restore().await.is_none());
    }
}
