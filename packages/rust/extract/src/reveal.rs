//! Reveal step support: detect whether solutions are visible, and build the
//! quiz form submission that makes them visible.

use std::collections::HashSet;

use scraper::{Html, Selector};

use quizrelay_shared::{QuizRelayError, Result};

use crate::{element_text, selector};

/// Heading text shown above solutions once a quiz has been submitted.
const REVEALED_MARKERS: [&str; 2] = ["Correct Answer:", "सही उत्तर:"];

/// Checks whether a quiz page already shows its solutions.
pub struct RevealProbe {
    head: Selector,
}

impl RevealProbe {
    pub fn new() -> Result<Self> {
        Ok(Self {
            head: selector(".solution-sec .head")?,
        })
    }

    pub fn is_revealed(&self, html: &str) -> bool {
        let doc = Html::parse_document(html);
        doc.select(&self.head)
            .next()
            .map(element_text)
            .is_some_and(|text| REVEALED_MARKERS.iter().any(|m| text.contains(m)))
    }
}

/// Form fields posted to reveal a quiz's solutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealForm {
    pub fields: Vec<(String, String)>,
}

impl RevealForm {
    /// Build the submission for the quiz at `page_url`: quiz ids, fixed
    /// timer fields, and the first option of every question.
    pub fn from_html(html: &str, page_url: &str) -> Result<Self> {
        let doc = Html::parse_document(html);
        let input_value = |id: &str| -> Result<String> {
            let sel = selector(&format!("input#{id}"))?;
            doc.select(&sel)
                .next()
                .and_then(|el| el.value().attr("value"))
                .map(str::to_string)
                .ok_or_else(|| QuizRelayError::Extraction(format!("{id} input not found")))
        };

        let mut fields = vec![
            ("intQuizId".to_string(), input_value("intQuizId")?),
            ("intEnglishQuizId".to_string(), input_value("intEnglishQuizId")?),
            ("txtCurrentURL".to_string(), page_url.to_string()),
            ("txtCurrentTime".to_string(), "0".to_string()),
            ("txtLoginPopupStatus".to_string(), "no".to_string()),
            ("pauseBtnhms".to_string(), "resume".to_string()),
        ];

        let radio = selector(r#"form#pendu_quiz input[type="radio"]"#)?;
        let mut answered = HashSet::new();
        for input in doc.select(&radio) {
            let (Some(name), Some(value)) = (input.value().attr("name"), input.value().attr("value"))
            else {
                continue;
            };
            if answered.insert(name) {
                fields.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self { fields })
    }

    /// Number of questions the form answers.
    pub fn answered(&self) -> usize {
        self.fields.len().saturating_sub(6)
    }
}
