//! Error types for quizrelay.
//!
//! Library crates use [`QuizRelayError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all quizrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum QuizRelayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {message}")]
    Network { message: String, transient: bool },

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Credentials rejected or the post-login marker was missing.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The source redirected an authenticated request to its login page.
    #[error("session expired while requesting {url}")]
    SessionExpired { url: String },

    /// HTML or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Required fields were missing from fetched content.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Local persistence error (serialization, corrupt document).
    #[error("storage error: {0}")]
    Storage(String),

    /// Remote backend error (unreachable, rejected, malformed).
    #[error("remote backend error: {0}")]
    Remote(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Translation service error.
    #[error("translation error: {0}")]
    Translation(String),

    /// Document rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Artifact exceeds the destination's upload limit.
    #[error("artifact is {size} bytes, destination limit is {limit} bytes")]
    SizeLimit { size: u64, limit: u64 },

    /// Delivery to the destination channel failed.
    #[error("distribution error: {0}")]
    Distribution(String),

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuizRelayError>;

impl QuizRelayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Network error that is worth retrying.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            transient: true,
        }
    }

    /// Network error that will not get better on retry.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            transient: false,
        }
    }

    /// Whether a retry could plausibly succeed: connection resets, timeouts,
    /// 429 and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { transient, .. } => *transient,
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}
