//! Core pipeline orchestration for quizrelay.
//!
//! Ties the session, source, extraction, translation, rendering and
//! distribution stages into one run, committing each item to the state
//! store only after it was delivered.

pub mod distribution;
pub mod enrichment;
pub mod pipeline;
pub mod stages;

pub use distribution::{TelegramDistributor, build_caption};
pub use enrichment::Translator;
pub use pipeline::{
    FatalError, ItemFailure, ItemOutcome, Orchestrator, ProgressReporter, RunOptions, RunOutcome,
    SilentProgress, Stage, mark_all,
};
pub use stages::{Distributor, Enricher, Extractor, Renderer, SessionProvider, Source, Stages};
