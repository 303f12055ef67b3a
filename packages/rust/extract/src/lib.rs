//! Content extraction for quiz pages.
//!
//! Pure functions over fetched HTML: listing links, reveal-state detection,
//! the reveal form payload, quiz questions and the date encoded in an item
//! URL. Nothing here touches the network.

mod date;
mod language;
mod listing;
mod quiz;
mod reveal;

use scraper::Selector;
use tracing::{info, instrument};

use quizrelay_shared::{QuizRecord, QuizRelayError, RawContent, Result};

pub use date::{DateExtractor, gujarati_month};
pub use language::is_english;
pub use listing::ListingExtractor;
pub use quiz::QuestionExtractor;
pub use reveal::{RevealForm, RevealProbe};

/// Compile a CSS selector, reporting failures as parse errors.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| QuizRelayError::parse(format!("selector {css:?}: {e}")))
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an element, whitespace-collapsed.
pub(crate) fn element_text(el: scraper::ElementRef<'_>) -> String {
    squash(&el.text().collect::<Vec<_>>().join(" "))
}

// ---------------------------------------------------------------------------
// QuizExtractor
// ---------------------------------------------------------------------------

/// Turns a fetched, revealed quiz page into a [`QuizRecord`].
///
/// Deterministic: the same content always yields the same record (the
/// date falls back to today only when the URL carries none).
pub struct QuizExtractor {
    questions: QuestionExtractor,
    dates: DateExtractor,
}

impl QuizExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            questions: QuestionExtractor::new()?,
            dates: DateExtractor::new()?,
        })
    }

    #[instrument(skip_all, fields(item = %raw.item_id))]
    pub fn extract(&self, raw: &RawContent) -> Result<QuizRecord> {
        let questions = self.questions.extract(&raw.html)?;
        let date = self.dates.extract_or_today(raw.item_id.as_str());
        info!(questions = questions.len(), date = %date.english, "extracted quiz");

        Ok(QuizRecord {
            item_id: raw.item_id.clone(),
            date,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizrelay_shared::ItemId;

    #[test]
    fn squash_collapses_whitespace() {
        assert_eq!(squash("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn extract_builds_record_with_url_date() {
        let html = r#"
<div class="q-section-inner-sol">
  <div class="q-name">Which river is the longest?</div>
  <div class="q-option"><ul>
    <li><div class="containerr-text-opt">A. Nile</div></li>
    <li><div class="containerr-text-opt">B. Amazon</div></li>
  </ul></div>
  <div class="solution-sec"><div class="head">Correct Answer:</div>
    <div class="answr">Answer: Option A</div></div>
</div>"#;
        let raw = RawContent {
            item_id: ItemId::from("https://pendulumedu.com/quiz/current-affairs/28-november-2025-current-affairs-quiz"),
            html: html.into(),
            revealed: true,
        };

        let record = QuizExtractor::new().expect("extractor").extract(&raw).expect("record");
        assert_eq!(record.questions.len(), 1);
        assert_eq!(record.questions[0].answer, 'A');
        assert_eq!(record.date.stamp(), "20251128");
        assert_eq!(record.item_id, raw.item_id);
    }
}
