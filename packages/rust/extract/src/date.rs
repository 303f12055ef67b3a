//! Dates embedded in quiz URLs.
//!
//! Recognised forms, tried in this order:
//! `23-and-24-november-2025`, `28-november-2025` / `28-nov-2025`,
//! `november-28-2025`, `28-11-2025`.

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use tracing::{debug, warn};

use quizrelay_shared::{QuizDate, QuizRelayError, Result};

const ENGLISH_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const GUJARATI_MONTHS: [&str; 12] = [
    "જાન્યુઆરી",
    "ફેબ્રુઆરી",
    "માર્ચ",
    "એપ્રિલ",
    "મે",
    "જૂન",
    "જુલાઈ",
    "ઓગસ્ટ",
    "સપ્ટેમ્બર",
    "ઓક્ટોબર",
    "નવેમ્બર",
    "ડિસેમ્બર",
];

/// Gujarati name of `month` (1-12).
pub fn gujarati_month(month: u32) -> Option<&'static str> {
    GUJARATI_MONTHS.get(month.checked_sub(1)? as usize).copied()
}

fn english_month(month: u32) -> Option<&'static str> {
    ENGLISH_MONTHS.get(month.checked_sub(1)? as usize).copied()
}

/// Full English month name or its three-letter form (`sept` also counts).
fn parse_month(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    if name == "sept" {
        return Some(9);
    }
    ENGLISH_MONTHS
        .iter()
        .position(|m| {
            let full = m.to_ascii_lowercase();
            name == full || (name.len() == 3 && full.starts_with(name.as_str()))
        })
        .map(|i| i as u32 + 1)
}

pub struct DateExtractor {
    range: Regex,
    day_month: Regex,
    month_day: Regex,
    numeric: Regex,
}

impl DateExtractor {
    pub fn new() -> Result<Self> {
        let regex =
            |p: &str| Regex::new(p).map_err(|e| QuizRelayError::parse(format!("regex {p:?}: {e}")));
        Ok(Self {
            range: regex(r"(?i)(\d{1,2})-and-(\d{1,2})-([a-z]+)-(\d{4})")?,
            day_month: regex(r"(?i)(\d{1,2})-([a-z]+)-(\d{4})")?,
            month_day: regex(r"(?i)([a-z]+)-(\d{1,2})-(\d{4})")?,
            numeric: regex(r"(\d{1,2})-(\d{1,2})-(\d{4})")?,
        })
    }

    /// Date named by `url`, if any form matches a real calendar day.
    pub fn extract(&self, url: &str) -> Option<QuizDate> {
        let found = self
            .from_range(url)
            .or_else(|| self.from_named(&self.day_month, url, 1, 2))
            .or_else(|| self.from_named(&self.month_day, url, 2, 1))
            .or_else(|| self.from_numeric(url));

        match &found {
            Some(d) => debug!(url, date = %d.english, "extracted date"),
            None => warn!(url, "could not extract date from URL"),
        }
        found
    }

    /// Like [`extract`](Self::extract), falling back to today's local date.
    pub fn extract_or_today(&self, url: &str) -> QuizDate {
        self.extract(url)
            .unwrap_or_else(|| single_day(Local::now().date_naive()))
    }

    fn from_range(&self, url: &str) -> Option<QuizDate> {
        self.range.captures_iter(url).find_map(|c| {
            let first: u32 = c[1].parse().ok()?;
            let second: u32 = c[2].parse().ok()?;
            let month = parse_month(&c[3])?;
            let year: i32 = c[4].parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, first)?;
            NaiveDate::from_ymd_opt(year, month, second)?;

            Some(QuizDate {
                date,
                english: format!("{first} and {second} {} {year}", english_month(month)?),
                localized: format!("{first} અને {second} {} {year}", gujarati_month(month)?),
            })
        })
    }

    fn from_named(&self, pattern: &Regex, url: &str, day_group: usize, month_group: usize) -> Option<QuizDate> {
        pattern.captures_iter(url).find_map(|c| {
            let day: u32 = c[day_group].parse().ok()?;
            let month = parse_month(&c[month_group])?;
            let year: i32 = c[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(single_day)
        })
    }

    fn from_numeric(&self, url: &str) -> Option<QuizDate> {
        self.numeric.captures_iter(url).find_map(|c| {
            let day: u32 = c[1].parse().ok()?;
            let month: u32 = c[2].parse().ok()?;
            let year: i32 = c[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(single_day)
        })
    }
}

fn single_day(date: NaiveDate) -> QuizDate {
    let (day, month, year) = (date.day(), date.month(), date.year());
    QuizDate {
        date,
        english: format!("{day} {} {year}", english_month(month).unwrap_or_default()),
        localized: format!("{day} {} {year}", gujarati_month(month).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(url: &str) -> QuizDate {
        DateExtractor::new()
            .expect("extractor")
            .extract(url)
            .expect("date")
    }

    #[test]
    fn day_month_year() {
        let d = extract("https://pendulumedu.com/quiz/current-affairs/28-november-2025-current-affairs-quiz");
        assert_eq!(d.english, "28 November 2025");
        assert_eq!(d.localized, "28 નવેમ્બર 2025");
        assert_eq!(d.stamp(), "20251128");
    }

    #[test]
    fn abbreviated_month() {
        assert_eq!(extract("/quiz/3-sept-2025").stamp(), "20250903");
        assert_eq!(extract("/quiz/3-Nov-2025").english, "3 November 2025");
    }

    #[test]
    fn date_range_uses_first_day() {
        let d = extract("/quiz/current-affairs/23-and-24-november-2025");
        assert_eq!(d.english, "23 and 24 November 2025");
        assert_eq!(d.localized, "23 અને 24 નવેમ્બર 2025");
        assert_eq!(d.stamp(), "20251123");
    }

    #[test]
    fn month_first() {
        let d = extract("/quiz/current-affairs-quiz-november-28-2025");
        assert_eq!(d.stamp(), "20251128");
    }

    #[test]
    fn numeric() {
        let d = extract("/quiz/daily-quiz-05-01-2026");
        assert_eq!(d.english, "5 January 2026");
        assert_eq!(d.stamp(), "20260105");
    }

    #[test]
    fn impossible_dates_are_rejected() {
        let extractor = DateExtractor::new().expect("extractor");
        assert!(extractor.extract("/quiz/31-november-2025").is_none());
        assert!(extractor.extract("/quiz/current-affairs").is_none());
    }

    #[test]
    fn fallback_is_today() {
        let extractor = DateExtractor::new().expect("extractor");
        let today = Local::now().date_naive();
        assert_eq!(extractor.extract_or_today("/quiz/no-date").date, today);
    }

    #[test]
    fn month_names() {
        assert_eq!(parse_month("december"), Some(12));
        assert_eq!(parse_month("Dec"), Some(12));
        assert_eq!(parse_month("and"), None);
        assert_eq!(parse_month("ma"), None);
        assert_eq!(parse_month("Sept"), Some(9));
        assert_eq!(parse_month("nova"), None);
        assert_eq!(parse_month("decem"), None);
        assert_eq!(parse_month("junes"), None);
        assert_eq!(gujarati_month(13), None);
    }
}
