//! Translation enrichment.
//!
//! Translates every question, option and explanation of a quiz through the
//! public Google Translate endpoint. Answer labels, item ids and the
//! configured preserved strings pass through verbatim. Results are cached
//! per process, keyed by a hash of language pair and text.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use quizrelay_shared::{
    EnrichedRecord, QuizOption, QuizQuestion, QuizRecord, QuizRelayError, Result, RetryConfig,
    TranslateConfig, with_retry,
};
use quizrelay_source::request_error;

use crate::stages::Enricher;

/// Translator backed by the `translate_a/single` endpoint.
pub struct Translator {
    config: TranslateConfig,
    retry: RetryConfig,
    client: Client,
    cache: Mutex<HashMap<String, String>>,
}

impl Translator {
    /// `retry` supplies the backoff shape; attempts come from the `[translate]` section.
    pub fn new(config: &TranslateConfig, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| QuizRelayError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            retry: RetryConfig {
                max_attempts: config.max_attempts,
                ..retry.clone()
            },
            config: config.clone(),
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Translate a whole quiz. Fails if any single text fails after retries.
    #[instrument(skip_all, fields(item = %record.item_id, questions = record.questions.len()))]
    pub async fn translate_record(&self, record: QuizRecord) -> Result<EnrichedRecord> {
        let QuizRecord {
            item_id,
            date,
            questions,
        } = record;

        let total = questions.len();
        let mut translated = Vec::with_capacity(total);
        for (i, question) in questions.into_iter().enumerate() {
            translated.push(self.translate_question(question).await?);
            debug!(question = i + 1, total, "translated question");

            if i + 1 < total {
                tokio::time::sleep(self.config.question_delay()).await;
            }
        }

        info!(questions = total, lang = %self.config.target_lang, "translation complete");
        Ok(EnrichedRecord {
            quiz: QuizRecord {
                item_id,
                date,
                questions: translated,
            },
            language: self.config.target_lang.clone(),
        })
    }

    async fn translate_question(&self, question: QuizQuestion) -> Result<QuizQuestion> {
        let text = self.translate_text(&question.text).await?;

        let mut options = Vec::with_capacity(question.options.len());
        for option in &question.options {
            options.push(QuizOption {
                label: option.label,
                text: self.translate_text(&option.text).await?,
            });
        }

        let explanation = self.translate_text(&question.explanation).await?;

        Ok(QuizQuestion {
            number: question.number,
            text,
            options,
            answer: question.answer,
            explanation,
        })
    }

    /// Translate one string. Blank and preserved strings are returned as-is.
    pub async fn translate_text(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() || self.config.preserve.iter().any(|p| p == text) {
            return Ok(text.to_string());
        }

        let key = cache_key(&self.config.source_lang, &self.config.target_lang, text);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let translated = with_retry(&self.retry, "translate", || async move {
            self.request(text).await
        })
        .await?;

        let translated = if translated.trim().is_empty() {
            warn!(chars = text.len(), "empty translation, keeping original text");
            text.to_string()
        } else {
            translated
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, translated.clone());
        }
        Ok(translated)
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    async fn request(&self, text: &str) -> Result<String> {
        let query = [
            ("client", "gtx"),
            ("sl", self.config.source_lang.as_str()),
            ("tl", self.config.target_lang.as_str()),
            ("dt", "t"),
            ("q", text),
        ];
        let response = self
            .client
            .get(self.config.endpoint.as_str())
            .query(&query)
            .send()
            .await
            .map_err(|e| request_error(&self.config.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizRelayError::Http {
                status: status.as_u16(),
                url: self.config.endpoint.clone(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QuizRelayError::Translation(format!("unreadable response: {e}")))?;
        parse_segments(&body)
    }
}

#[async_trait]
impl Enricher for Translator {
    async fn enrich(&self, record: QuizRecord) -> Result<EnrichedRecord> {
        self.translate_record(record).await
    }
}

/// The endpoint answers `[[["translated", "source", ...], ...], ...]`;
/// long inputs come back split across several segments.
fn parse_segments(body: &serde_json::Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| QuizRelayError::Translation("unexpected response shape".into()))?;

    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|s| s.as_str()))
        .collect())
}

fn cache_key(source: &str, target: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(target.as_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
