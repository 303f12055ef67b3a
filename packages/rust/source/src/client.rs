//! Source client: list candidate items and fetch their full content.

use reqwest::header::{COOKIE, REFERER};
use reqwest::{Client, redirect};
use tracing::{debug, info, instrument, warn};
use url::Url;

use quizrelay_extract::{ListingExtractor, RevealForm, RevealProbe};
use quizrelay_shared::{
    ItemId, QuizRelayError, RawContent, Result, RetryConfig, RevealMode, SessionArtifact,
    SourceConfig, with_retry,
};

use crate::http::{build_client, is_login_url, request_error};

/// Talks to the quiz site with an already-validated session.
pub struct SourceClient {
    config: SourceConfig,
    retry: RetryConfig,
    client: Client,
    listing_url: Url,
    submit_url: Url,
    listing: ListingExtractor,
    probe: RevealProbe,
}

impl SourceClient {
    pub fn new(config: &SourceConfig, retry: &RetryConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, redirect::Policy::limited(10))?,
            listing_url: config.url(&config.listing_path)?,
            submit_url: config.url(&config.submit_path)?,
            config: config.clone(),
            retry: retry.clone(),
            listing: ListingExtractor::new()?,
            probe: RevealProbe::new()?,
        })
    }

    /// Item identifiers from the listing page, in page order.
    #[instrument(skip_all, fields(url = %self.listing_url))]
    pub async fn list_candidates(&self, session: &SessionArtifact) -> Result<Vec<ItemId>> {
        let html = self.get_page(session, &self.listing_url, None).await?;
        let base = self.config.url("/")?;
        let ids = self.listing.extract(&html, &base);
        info!(count = ids.len(), "listed candidates");
        Ok(ids)
    }

    /// Fetch an item page, performing the reveal step when solutions are hidden.
    #[instrument(skip_all, fields(item = %id))]
    pub async fn fetch_full(&self, session: &SessionArtifact, id: &ItemId) -> Result<RawContent> {
        let url = Url::parse(id.as_str())
            .map_err(|e| QuizRelayError::validation(format!("item id is not a URL: {id}: {e}")))?;

        let html = self.get_page(session, &url, Some(&self.listing_url)).await?;
        if self.probe.is_revealed(&html) {
            debug!("solutions already visible");
            return Ok(RawContent {
                item_id: id.clone(),
                html,
                revealed: true,
            });
        }

        if self.config.reveal_mode == RevealMode::None {
            return Ok(RawContent {
                item_id: id.clone(),
                html,
                revealed: false,
            });
        }

        let form = RevealForm::from_html(&html, url.as_str())?;
        self.submit_reveal(session, &url, &form).await?;

        let html = self.get_page(session, &url, Some(&self.listing_url)).await?;
        let revealed = self.probe.is_revealed(&html);
        if revealed {
            info!(answered = form.answered(), "revealed solutions");
        } else {
            warn!("solutions still hidden after reveal step");
        }
        Ok(RawContent {
            item_id: id.clone(),
            html,
            revealed,
        })
    }

    /// GET with the session cookies, retrying transient failures.
    async fn get_page(&self, session: &SessionArtifact, url: &Url, referer: Option<&Url>) -> Result<String> {
        with_retry(&self.retry, url.as_str(), || async move {
            tokio::time::sleep(self.config.request_delay()).await;

            let mut request = self
                .client
                .get(url.as_str())
                .header(COOKIE, session.cookie_header());
            if let Some(referer) = referer {
                request = request.header(REFERER, referer.as_str());
            }

            let response = request
                .send()
                .await
                .map_err(|e| request_error(url.as_str(), e))?;

            if is_login_url(response.url(), &self.config.login_path) {
                return Err(QuizRelayError::SessionExpired {
                    url: url.to_string(),
                });
            }

            let status = response.status();
            if !status.is_success() {
                return Err(QuizRelayError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response
                .text()
                .await
                .map_err(|e| request_error(url.as_str(), e))
        })
        .await
    }

    async fn submit_reveal(&self, session: &SessionArtifact, page: &Url, form: &RevealForm) -> Result<()> {
        let origin = page.origin().ascii_serialization();
        let origin = origin.as_str();
        with_retry(&self.retry, self.submit_url.as_str(), || async move {
            let response = self
                .client
                .post(self.submit_url.as_str())
                .header(COOKIE, session.cookie_header())
                .header(REFERER, page.as_str())
                .header("Origin", origin)
                .form(&form.fields)
                .send()
                .await
                .map_err(|e| request_error(self.submit_url.as_str(), e))?;

            if is_login_url(response.url(), &self.config.login_path) {
                return Err(QuizRelayError::SessionExpired {
                    url: self.submit_url.to_string(),
                });
            }
            let status = response.status();
            if !status.is_success() {
                return Err(QuizRelayError::Http {
                    status: status.as_u16(),
                    url: self.submit_url.to_string(),
                });
            }
            debug!(status = status.as_u16(), "reveal form submitted");
            Ok(())
        })
        .await?;

        // Give the site a moment to record the submission.
        tokio::time::sleep(self.config.request_delay()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> SourceConfig {
        SourceConfig {
            base_url: server.uri(),
            request_delay_ms: 0,
            timeout_secs: 5,
            ..SourceConfig::default()
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn session() -> SessionArtifact {
        let mut cookies = BTreeMap::new();
        cookies.insert("PHPSESSID".to_string(), "abc".to_string());
        SessionArtifact::new(cookies)
    }

    const HIDDEN: &str = r#"<form id="pendu_quiz">
<input id="intQuizId" value="7"><input id="intEnglishQuizId" value="8">
<input type="radio" name="q_1" value="11"></form>
<div class="solution-sec"><div class="head">Solution:</div></div>"#;

    const REVEALED: &str =
        r#"<div class="solution-sec"><div class="head">Correct Answer: A</div></div>"#;

    #[tokio::test]
    async fn lists_candidates_with_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/current-affairs"))
            .and(header("cookie", "PHPSESSID=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="card-section"><a href="/quiz/a-1-november-2025">A</a></div>
<div class="card-section"><a href="/quiz/b-2-november-2025">B</a></div>"#,
            ))
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let ids = client.list_candidates(&session()).await.expect("list");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), format!("{}/quiz/a-1-november-2025", server.uri()));
    }

    #[tokio::test]
    async fn fetch_performs_reveal_then_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/q1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HIDDEN))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/quiz/quizanwers"))
            .and(body_string_contains("intQuizId=7"))
            .and(body_string_contains("q_1=11"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quiz/q1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REVEALED))
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let id = ItemId::new(format!("{}/quiz/q1", server.uri()));
        let raw = client.fetch_full(&session(), &id).await.expect("fetch");
        assert!(raw.revealed);
        assert!(raw.html.contains("Correct Answer"));
    }

    #[tokio::test]
    async fn already_revealed_page_skips_form() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/q2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REVEALED))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let id = ItemId::new(format!("{}/quiz/q2", server.uri()));
        assert!(client.fetch_full(&session(), &id).await.expect("fetch").revealed);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/q3"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quiz/q3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REVEALED))
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let id = ItemId::new(format!("{}/quiz/q3", server.uri()));
        assert!(client.fetch_full(&session(), &id).await.is_ok());
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let id = ItemId::new(format!("{}/quiz/gone", server.uri()));
        let err = client.fetch_full(&session(), &id).await.unwrap_err();
        assert!(matches!(err, QuizRelayError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn login_redirect_is_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/q4"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{}/login", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<form>Sign in</form>"))
            .mount(&server)
            .await;

        let client = SourceClient::new(&config(&server), &retry()).expect("client");
        let id = ItemId::new(format!("{}/quiz/q4", server.uri()));
        let err = client.fetch_full(&session(), &id).await.unwrap_err();
        assert!(matches!(err, QuizRelayError::SessionExpired { .. }));
    }
}
