//! Question extraction from a revealed quiz page.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use quizrelay_shared::{QuizOption, QuizQuestion, QuizRelayError, Result};

use crate::language::is_english;
use crate::{element_text, selector, squash};

const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Extracts questions, options, answers and explanations.
pub struct QuestionExtractor {
    section_solved: Selector,
    section_plain: Selector,
    name: Selector,
    option_block: Selector,
    option_item: Selector,
    option_text: Selector,
    solution: Selector,
    answer_block: Selector,
    explanation: Selector,
    list_item: Selector,
    paragraph: Selector,
    answer_pattern: Regex,
    label_prefix: Regex,
}

impl QuestionExtractor {
    pub fn new() -> Result<Self> {
        let regex =
            |p: &str| Regex::new(p).map_err(|e| QuizRelayError::parse(format!("regex {p:?}: {e}")));
        Ok(Self {
            section_solved: selector("div.q-section-inner-sol")?,
            section_plain: selector("div.q-section-inner")?,
            name: selector("div.q-name")?,
            option_block: selector("div.q-option")?,
            option_item: selector("li")?,
            option_text: selector("div.containerr-text-opt")?,
            solution: selector("div.solution-sec")?,
            answer_block: selector("div.answr")?,
            explanation: selector("div.ans-text")?,
            list_item: selector("li")?,
            paragraph: selector("p")?,
            answer_pattern: regex(r"(?i:correct answer|answer|ans)[\s:]*(?i:option[\s:]*)?([A-D])\b")?,
            label_prefix: regex(r"^[A-D](?:[.)]\s*|\s+)")?,
        })
    }

    /// English questions from `html`, numbered from 1.
    ///
    /// Sections missing required parts are skipped with a warning. Having no
    /// usable question at all is an extraction error.
    pub fn extract(&self, html: &str) -> Result<Vec<QuizQuestion>> {
        let doc = Html::parse_document(html);

        let mut sections: Vec<ElementRef<'_>> = doc.select(&self.section_solved).collect();
        if sections.is_empty() {
            debug!("no solved sections, trying plain question sections");
            sections = doc.select(&self.section_plain).collect();
        }
        if sections.is_empty() {
            return Err(QuizRelayError::Extraction(
                "no question sections found".into(),
            ));
        }

        let mut questions = Vec::new();
        let mut skipped_language = 0usize;
        for (idx, section) in sections.iter().enumerate() {
            let question = match self.parse_section(*section) {
                Ok(q) => q,
                Err(e) => {
                    warn!(section = idx + 1, error = %e, "skipping question");
                    continue;
                }
            };
            if !is_english(&question.text) {
                skipped_language += 1;
                continue;
            }
            questions.push(QuizQuestion {
                number: questions.len() + 1,
                ..question
            });
        }

        info!(
            sections = sections.len(),
            kept = questions.len(),
            skipped_language,
            "parsed questions"
        );

        if questions.is_empty() {
            return Err(QuizRelayError::Extraction(
                "no English questions could be parsed".into(),
            ));
        }
        Ok(questions)
    }

    fn parse_section(&self, section: ElementRef<'_>) -> Result<QuizQuestion> {
        let text = section
            .select(&self.name)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| QuizRelayError::Extraction("question text not found".into()))?;

        let options = self.options(section);
        if options.is_empty() {
            return Err(QuizRelayError::Extraction("no options found".into()));
        }

        let solution = section.select(&self.solution).next();
        let answer = solution
            .and_then(|s| self.answer(s))
            .ok_or_else(|| QuizRelayError::Extraction("correct answer not found".into()))?;
        let explanation = solution.map(|s| self.explanation(s)).unwrap_or_default();

        Ok(QuizQuestion {
            number: 0,
            text,
            options,
            answer,
            explanation,
        })
    }

    fn options(&self, section: ElementRef<'_>) -> Vec<QuizOption> {
        let Some(block) = section.select(&self.option_block).next() else {
            return Vec::new();
        };

        block
            .select(&self.option_item)
            .filter_map(|li| li.select(&self.option_text).next())
            .map(|div| self.label_prefix.replace(&element_text(div), "").trim().to_string())
            .filter(|text| !text.is_empty())
            .zip(OPTION_LABELS)
            .map(|(text, label)| QuizOption { label, text })
            .collect()
    }

    fn answer(&self, solution: ElementRef<'_>) -> Option<char> {
        let text = element_text(solution);
        if let Some(label) = self
            .answer_pattern
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().chars().next())
        {
            return Some(label);
        }
        if let Some(label) = text.chars().next().filter(|_| text.chars().count() == 1) {
            if OPTION_LABELS.contains(&label) {
                return Some(label);
            }
        }

        solution
            .select(&self.answer_block)
            .next()
            .map(element_text)
            .and_then(|t| t.chars().rev().find(|c| OPTION_LABELS.contains(c)))
    }

    fn explanation(&self, solution: ElementRef<'_>) -> String {
        let Some(block) = solution.select(&self.explanation).next() else {
            debug!("no explanation block");
            return String::new();
        };

        let mut parts: Vec<String> = block
            .select(&self.list_item)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .map(|t| format!("• {t}"))
            .collect();

        for p in block.select(&self.paragraph) {
            let text = element_text(p).replace('·', "•");
            if !text.is_empty() && !parts.contains(&text) {
                parts.push(text);
            }
        }

        if parts.is_empty() {
            return element_text(block);
        }
        squash(&parts.join(" "))
    }
}
