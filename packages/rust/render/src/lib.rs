//! Rendering stage: turns a translated quiz into a distributable document.
//!
//! The document is built as HTML and, for the PDF format, printed by a
//! headless browser. Output files land in the configured output directory.

pub mod pdf;
pub mod template;

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use quizrelay_shared::{
    Artifact, EnrichedRecord, QuizRelayError, RenderConfig, RenderFormat, Result,
};

pub use template::render_html;

/// Renders enriched quiz records into files under `output_dir`.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    config: RenderConfig,
    footer: Vec<String>,
}

impl DocumentRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            config: config.clone(),
            footer: Vec::new(),
        }
    }

    /// Lines printed at the bottom of every document.
    pub fn with_footer(mut self, footer: Vec<String>) -> Self {
        self.footer = footer;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// File name for the document of `record`, e.g. `current_affairs_quiz_20251128.pdf`.
    pub fn file_name(&self, record: &EnrichedRecord) -> String {
        let ext = match self.config.format {
            RenderFormat::Pdf => "pdf",
            RenderFormat::Html => "html",
        };
        format!("current_affairs_quiz_{}.{ext}", record.quiz.date.stamp())
    }

    #[instrument(skip_all, fields(item = %record.quiz.item_id, questions = record.quiz.questions.len()))]
    pub async fn render(&self, record: &EnrichedRecord) -> Result<Artifact> {
        if record.quiz.questions.is_empty() {
            return Err(QuizRelayError::Render("record has no questions".into()));
        }

        let dir = &self.config.output_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| QuizRelayError::io(dir, e))?;

        let html = render_html(record, &self.config.title, &self.footer);
        let file_name = self.file_name(record);
        let target = dir.join(&file_name);

        let (bytes, media_type) = match self.config.format {
            RenderFormat::Html => {
                write_atomic(&target, html.as_bytes()).await?;
                (html.into_bytes(), "text/html")
            }
            RenderFormat::Pdf => {
                // The HTML source is kept next to the PDF for inspection.
                let source = dir.join(format!("quiz_{}.html", record.quiz.date.stamp()));
                write_atomic(&source, html.as_bytes()).await?;

                let temp = dir.join(format!(".{file_name}.tmp"));
                pdf::convert(&self.config.browser, &source, &temp, self.config.timeout()).await?;
                tokio::fs::rename(&temp, &target)
                    .await
                    .map_err(|e| QuizRelayError::io(&target, e))?;

                let bytes = tokio::fs::read(&target)
                    .await
                    .map_err(|e| QuizRelayError::io(&target, e))?;
                (bytes, "application/pdf")
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());
        info!(file = %file_name, size = bytes.len(), sha256 = %hash, "rendered document");

        Ok(Artifact {
            file_name,
            media_type: media_type.to_string(),
            bytes,
        })
    }
}

/// Write to a temp sibling, then rename over `target`.
async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{name}.tmp"));
    tokio::fs::write(&temp, contents)
        .await
        .map_err(|e| QuizRelayError::io(&temp, e))?;
    tokio::fs::rename(&temp, target)
        .await
        .map_err(|e| QuizRelayError::io(target, e))?;
    debug!(path = %target.display(), size = contents.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use quizrelay_shared::{ItemId, QuizDate, QuizOption, QuizQuestion, QuizRecord};

    fn record(questions: usize) -> EnrichedRecord {
        EnrichedRecord {
            quiz: QuizRecord {
                item_id: ItemId::from("https://q/28-november-2025"),
                date: QuizDate {
                    date: chrono::NaiveDate::from_ymd_opt(2025, 11, 28).expect("date"),
                    english: "28 November 2025".into(),
                    localized: "28 નવેમ્બર 2025".into(),
                },
                questions: (1..=questions)
                    .map(|n| QuizQuestion {
                        number: n,
                        text: format!("Question {n}"),
                        options: vec![
                            QuizOption { label: 'A', text: "Yes".into() },
                            QuizOption { label: 'B', text: "No".into() },
                        ],
                        answer: 'A',
                        explanation: String::new(),
                    })
                    .collect(),
            },
            language: "gu".into(),
        }
    }

    fn renderer(format: RenderFormat) -> (DocumentRenderer, PathBuf) {
        let dir = std::env::temp_dir().join(format!("qr_render_{}", uuid::Uuid::now_v7()));
        let config = RenderConfig {
            output_dir: dir.clone(),
            format,
            ..RenderConfig::default()
        };
        (DocumentRenderer::new(&config), dir)
    }

    #[tokio::test]
    async fn html_format_writes_document() {
        let (renderer, dir) = renderer(RenderFormat::Html);
        let artifact = renderer.render(&record(2)).await.expect("render");

        assert_eq!(artifact.file_name, "current_affairs_quiz_20251128.html");
        assert_eq!(artifact.media_type, "text/html");
        let on_disk = std::fs::read(dir.join(&artifact.file_name)).expect("written");
        assert_eq!(on_disk, artifact.bytes);
        assert!(!dir.join(".current_affairs_quiz_20251128.html.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_record_is_render_error() {
        let (renderer, dir) = renderer(RenderFormat::Html);
        let err = renderer.render(&record(0)).await.unwrap_err();
        assert!(matches!(err, QuizRelayError::Render(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn pdf_without_browser_fails() {
        let (renderer, dir) = renderer(RenderFormat::Pdf);
        let renderer = DocumentRenderer {
            config: RenderConfig {
                browser: "quizrelay-no-such-browser".into(),
                ..renderer.config
            },
            footer: Vec::new(),
        };
        let err = renderer.render(&record(1)).await.unwrap_err();
        assert!(matches!(err, QuizRelayError::Render(_)));
        // The HTML source was still written.
        assert!(dir.join("quiz_20251128.html").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_name_follows_format() {
        let (renderer, _) = renderer(RenderFormat::Pdf);
        assert_eq!(renderer.file_name(&record(1)), "current_affairs_quiz_20251128.pdf");
    }
}
