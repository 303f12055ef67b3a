//! Core domain types for quizrelay runs.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Stable identifier of one source item (its canonical URL). The sole dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ProcessedSet
// ---------------------------------------------------------------------------

/// In-memory set of processed identifiers with O(1) membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    ids: HashSet<ItemId>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, id: ItemId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &ItemId) -> bool {
        self.ids.remove(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in sorted order, as they are written to disk.
    pub fn sorted(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn to_document(&self) -> StateDocument {
        StateDocument {
            processed_urls: self.sorted(),
        }
    }
}

impl FromIterator<ItemId> for ProcessedSet {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Persisted layout of the processed set: one array field, sorted for diffability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub processed_urls: Vec<ItemId>,
}

impl From<StateDocument> for ProcessedSet {
    fn from(doc: StateDocument) -> Self {
        doc.processed_urls.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// SessionArtifact
// ---------------------------------------------------------------------------

/// Authentication cookies captured at login, reused across runs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifact {
    /// Cookie name -> value.
    pub cookies: BTreeMap<String, String>,
    /// When the login that produced these cookies happened.
    pub created_at: DateTime<Utc>,
    /// Cleared when the source rejects the session mid-run.
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl SessionArtifact {
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            created_at: Utc::now(),
            valid: true,
        }
    }

    /// `Cookie` request header value (`a=1; b=2`).
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

// Cookie values are credentials; keep them out of logs.
impl std::fmt::Debug for SessionArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionArtifact")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("created_at", &self.created_at)
            .field("valid", &self.valid)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pipeline records
// ---------------------------------------------------------------------------

/// Fetched page content for one item, after any reveal step.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub item_id: ItemId,
    pub html: String,
    /// Whether the solutions were visible in `html`.
    pub revealed: bool,
}

/// Date parsed from an item URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDate {
    pub date: NaiveDate,
    /// e.g. "28 November 2025" or "23 and 24 November 2025".
    pub english: String,
    /// Same date with Gujarati month names.
    pub localized: String,
}

impl QuizDate {
    /// `YYYYMMDD`, used in artifact file names.
    pub fn stamp(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

/// One labelled answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub label: char,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub number: usize,
    pub text: String,
    pub options: Vec<QuizOption>,
    /// Label of the correct option (`A`-`D`).
    pub answer: char,
    #[serde(default)]
    pub explanation: String,
}

/// Structured quiz extracted from one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub item_id: ItemId,
    pub date: QuizDate,
    pub questions: Vec<QuizQuestion>,
}

/// A quiz whose text fields have been translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub quiz: QuizRecord,
    /// Target language code (e.g. `gu`).
    pub language: String,
}

/// Distributable document produced by the rendering stage.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Counts for one orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub discovered: usize,
    pub new: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// New items never started because the run was cancelled or aborted.
    pub not_started: usize,
    /// `(item, stage, error)` for every failed item.
    pub failures: Vec<(ItemId, String, String)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            discovered: 0,
            new: 0,
            succeeded: 0,
            failed: 0,
            not_started: 0,
            failures: Vec::new(),
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_set_document_is_sorted() {
        let set: ProcessedSet = ["https://x/c", "https://x/a", "https://x/b"]
            .into_iter()
            .map(ItemId::from)
            .collect();
        let json = serde_json::to_string(&set.to_document()).expect("serialize");
        assert_eq!(
            json,
            r#"{"processed_urls":["https://x/a","https://x/b","https://x/c"]}"#
        );
    }

    #[test]
    fn state_document_tolerates_missing_field() {
        let doc: StateDocument = serde_json::from_str("{}").expect("deserialize");
        assert!(ProcessedSet::from(doc).is_empty());
    }

    #[test]
    fn session_cookie_header_and_redacted_debug() {
        let mut cookies = BTreeMap::new();
        cookies.insert("PHPSESSID".to_string(), "secret-1".to_string());
        cookies.insert("pendulum_session".to_string(), "secret-2".to_string());
        let session = SessionArtifact::new(cookies);

        assert_eq!(
            session.cookie_header(),
            "PHPSESSID=secret-1; pendulum_session=secret-2"
        );
        let debug = format!("{session:?}");
        assert!(debug.contains("PHPSESSID"));
        assert!(!debug.contains("secret-1"));
    }

    #[test]
    fn session_valid_defaults_true() {
        let json = r#"{"cookies":{"a":"b"},"created_at":"2025-11-28T10:00:00Z"}"#;
        let session: SessionArtifact = serde_json::from_str(json).expect("deserialize");
        assert!(session.valid);
    }

    #[test]
    fn quiz_date_stamp() {
        let date = QuizDate {
            date: NaiveDate::from_ymd_opt(2025, 11, 3).expect("date"),
            english: "3 November 2025".into(),
            localized: "3 નવેમ્બર 2025".into(),
        };
        assert_eq!(date.stamp(), "20251103");
    }
}
