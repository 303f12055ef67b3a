//! Telegram distribution: posts the rendered document to a channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{info, instrument};

use quizrelay_shared::{Artifact, EnrichedRecord, QuizRelayError, Result, TelegramConfig};

use crate::stages::Distributor;

/// Telegram's limit on document captions, in characters.
pub const CAPTION_LIMIT: usize = 1024;

/// Sends documents through the Bot API `sendDocument` method.
pub struct TelegramDistributor {
    config: TelegramConfig,
    token: String,
    client: Client,
}

impl TelegramDistributor {
    pub fn new(config: &TelegramConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| QuizRelayError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config: config.clone(),
            token,
            client,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/bot{}/sendDocument",
            self.config.api_base.trim_end_matches('/'),
            self.token
        )
    }

    #[instrument(skip_all, fields(channel = %self.config.channel, file = %artifact.file_name, size = artifact.size_bytes()))]
    pub async fn send_document(&self, artifact: &Artifact, caption: &str) -> Result<()> {
        let size = artifact.size_bytes();
        let limit = self.config.max_upload_bytes;
        if size > limit {
            return Err(QuizRelayError::SizeLimit { size, limit });
        }

        let document = Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name.clone())
            .mime_str(&artifact.media_type)
            .map_err(|e| QuizRelayError::Distribution(format!("invalid media type: {e}")))?;
        let form = Form::new()
            .text("chat_id", self.config.channel.clone())
            .text("caption", caption.to_string())
            .part("document", document);

        // The URL embeds the bot token; keep it out of error messages.
        let response = self
            .client
            .post(self.send_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                QuizRelayError::Distribution(format!("upload failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(QuizRelayError::SizeLimit { size, limit });
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let ok = body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
        if !status.is_success() || !ok {
            let description = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            if description.contains("too big") {
                return Err(QuizRelayError::SizeLimit { size, limit });
            }
            return Err(QuizRelayError::Distribution(format!(
                "telegram returned {status}: {description}"
            )));
        }

        info!("document sent");
        Ok(())
    }
}

#[async_trait]
impl Distributor for TelegramDistributor {
    fn caption(&self, record: &EnrichedRecord) -> String {
        build_caption(record, &self.config.branding)
    }

    async fn distribute(&self, artifact: &Artifact, caption: &str) -> Result<()> {
        self.send_document(artifact, caption).await
    }
}

/// Caption for a quiz document, cut to [`CAPTION_LIMIT`] characters.
pub fn build_caption(record: &EnrichedRecord, branding: &[String]) -> String {
    let mut lines = vec![
        "📚 Today's Current Affairs Quiz PDF".to_string(),
        format!("📅 Date: {}", record.quiz.date.english),
        format!("❓ Questions: {}", record.quiz.questions.len()),
    ];
    if !branding.is_empty() {
        lines.push(String::new());
        lines.extend(branding.iter().cloned());
    }
    truncate_chars(&lines.join("\n"), CAPTION_LIMIT)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizrelay_shared::{ItemId, QuizDate, QuizRecord};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> EnrichedRecord {
        EnrichedRecord {
            quiz: QuizRecord {
                item_id: ItemId::from("https://q/28-november-2025"),
                date: QuizDate {
                    date: chrono::NaiveDate::from_ymd_opt(2025, 11, 28).expect("date"),
                    english: "28 November 2025".into(),
                    localized: "28 નવેમ્બર 2025".into(),
                },
                questions: Vec::new(),
            },
            language: "gu".into(),
        }
    }

    fn artifact(size: usize) -> Artifact {
        Artifact {
            file_name: "current_affairs_quiz_20251128.pdf".into(),
            media_type: "application/pdf".into(),
            bytes: vec![b'%'; size],
        }
    }

    fn distributor(server: &MockServer, max: u64) -> TelegramDistributor {
        let config = TelegramConfig {
            api_base: server.uri(),
            max_upload_bytes: max,
            ..TelegramConfig::default()
        };
        TelegramDistributor::new(&config, "123:abc".into()).expect("distributor")
    }

    #[test]
    fn caption_lists_date_count_and_branding() {
        let caption = build_caption(&record(), &["📢 Channel: @currentadda".into()]);
        assert!(caption.starts_with("📚 Today's Current Affairs Quiz PDF\n📅 Date: 28 November 2025"));
        assert!(caption.contains("❓ Questions: 0"));
        assert!(caption.ends_with("📢 Channel: @currentadda"));
    }

    #[test]
    fn caption_is_truncated_to_limit() {
        let branding = vec!["x".repeat(3000)];
        let caption = build_caption(&record(), &branding);
        assert_eq!(caption.chars().count(), CAPTION_LIMIT);
        assert!(caption.ends_with('…'));
    }

    #[tokio::test]
    async fn uploads_document_to_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("@currentadda"))
            .and(body_string_contains("current_affairs_quiz_20251128.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        distributor(&server, 1024)
            .distribute(&artifact(10), "caption")
            .await
            .expect("sent");
    }

    #[tokio::test]
    async fn oversized_artifact_is_rejected_before_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = distributor(&server, 8).distribute(&artifact(9), "c").await.unwrap_err();
        assert!(matches!(err, QuizRelayError::SizeLimit { size: 9, limit: 8 }));
    }

    #[tokio::test]
    async fn payload_too_large_maps_to_size_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;

        let err = distributor(&server, 1024).distribute(&artifact(10), "c").await.unwrap_err();
        assert!(matches!(err, QuizRelayError::SizeLimit { .. }));
    }

    #[tokio::test]
    async fn api_error_is_distribution_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                serde_json::json!({"ok": false, "description": "Bad Request: chat not found"}),
            ))
            .mount(&server)
            .await;

        let err = distributor(&server, 1024).distribute(&artifact(10), "c").await.unwrap_err();
        match err {
            QuizRelayError::Distribution(msg) => assert!(msg.contains("chat not found")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
