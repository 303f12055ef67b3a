//! Shared types, error model, and configuration for quizrelay.
//!
//! This crate is the foundation depended on by all other quizrelay crates.
//! It provides:
//! - [`QuizRelayError`], the unified error type
//! - Domain types ([`ItemId`], [`ProcessedSet`], [`SessionArtifact`], [`QuizRecord`], [`Artifact`], [`RunSummary`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`with_retry`], exponential backoff for transient failures

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, CredentialsConfig, RemoteConfig, RemoteTarget, RenderConfig,
    RenderFormat, RetryConfig, RevealMode, RunConfig, SessionConfig, SourceConfig, StateConfig,
    TelegramConfig, TranslateConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{QuizRelayError, Result};
pub use retry::{IsRetryable, with_retry};
pub use types::{
    Artifact, EnrichedRecord, ItemId, ProcessedSet, QuizDate, QuizOption, QuizQuestion,
    QuizRecord, RawContent, RunSummary, SessionArtifact, StateDocument,
};
