//! Run orchestration: session → list → filter → per-item stages → commit.
//!
//! The orchestrator is the only place that decides commit-vs-skip and
//! fatal-vs-recoverable. Each item runs its stages strictly in order and is
//! committed only after distribution succeeded; a failing item is logged and
//! left uncommitted so the next run retries it.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use quizrelay_shared::{ItemId, QuizRelayError, RunSummary, SessionArtifact};
use quizrelay_storage::StateStore;

use crate::stages::{SessionProvider, Source, Stages};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-item pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Enrich,
    Render,
    Distribute,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Enrich => "enrich",
            Self::Render => "render",
            Self::Distribute => "distribute",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item's failure: where it stopped and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct ItemFailure {
    pub stage: Stage,
    pub error: QuizRelayError,
}

impl ItemFailure {
    fn at(stage: Stage) -> impl FnOnce(QuizRelayError) -> Self {
        move |error| Self { stage, error }
    }

    /// Split off failures that make continuing the run pointless or unsafe.
    fn classify(self) -> Result<Self, FatalError> {
        if self.stage == Stage::Commit {
            return Err(FatalError::StateIntegrity(self.error));
        }
        if matches!(self.error, QuizRelayError::SessionExpired { .. }) {
            return Err(FatalError::Authentication(self.error));
        }
        Ok(self)
    }
}

/// Tagged result of processing one new item.
#[derive(Debug)]
pub enum ItemOutcome {
    Committed,
    Failed(ItemFailure),
    /// Skipped because the run was cancelled before the item started.
    NotStarted,
}

/// Errors that abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// No valid session could be obtained, or the source dropped it mid-run.
    #[error("authentication failure: {0}")]
    Authentication(QuizRelayError),

    /// The local state file could not be written.
    #[error("state integrity failure: {0}")]
    StateIntegrity(QuizRelayError),

    /// The listing page could not be fetched or read.
    #[error("listing failure: {0}")]
    Listing(QuizRelayError),
}

/// Final result of a run: counts, plus the fatal cause if it was aborted.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub fatal: Option<FatalError>,
}

impl RunOutcome {
    fn aborted(summary: RunSummary, cause: FatalError) -> Self {
        Self {
            summary,
            fatal: Some(cause),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a new item starts its stages.
    fn item_started(&self, id: &ItemId, current: usize, total: usize);
    /// Called when an item reaches a terminal outcome.
    fn item_finished(&self, id: &ItemId, outcome: &ItemOutcome);
    /// Called once when the run ends.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _id: &ItemId, _current: usize, _total: usize) {}
    fn item_finished(&self, _id: &ItemId, _outcome: &ItemOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Items in flight at once; 1 keeps listing order.
    pub concurrency: usize,
    /// List new items without processing them.
    pub dry_run: bool,
    /// Bounded wait for background remote syncs at the end of a run.
    pub flush_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            dry_run: false,
            flush_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Orchestrator {
    stages: Stages,
    state: StateStore,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(stages: Stages, state: StateStore, options: RunOptions) -> Self {
        Self {
            stages,
            state,
            options,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run the full pipeline once.
    ///
    /// Cancelling `cancel` stops new items from starting; items already in
    /// flight finish their stages (and commit) first.
    #[instrument(skip_all, fields(concurrency = self.options.concurrency, dry_run = self.options.dry_run))]
    pub async fn run(&self, cancel: &CancellationToken, progress: &dyn ProgressReporter) -> RunOutcome {
        let mut summary = RunSummary::new();
        info!(run_id = %summary.run_id, "starting run");

        let outcome = self.run_inner(cancel, progress, &mut summary).await;
        self.flush().await;
        progress.done(&summary);

        match outcome {
            Ok(()) => {
                info!(
                    discovered = summary.discovered,
                    new = summary.new,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    not_started = summary.not_started,
                    "run complete"
                );
                RunOutcome {
                    summary,
                    fatal: None,
                }
            }
            Err(cause) => {
                error!(error = %cause, "run aborted");
                RunOutcome::aborted(summary, cause)
            }
        }
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
        summary: &mut RunSummary,
    ) -> Result<(), FatalError> {
        progress.phase("Acquiring session");
        let session = self
            .stages
            .session
            .acquire()
            .await
            .map_err(FatalError::Authentication)?;

        progress.phase("Listing quizzes");
        let fresh = self.discover(&session, summary).await?;
        if fresh.is_empty() {
            info!("nothing new to process");
            return Ok(());
        }

        if self.options.dry_run {
            for id in &fresh {
                info!(item = %id, "would process");
            }
            summary.not_started = fresh.len();
            return Ok(());
        }

        progress.phase("Processing quizzes");
        self.process_all(&session, fresh, cancel, progress, summary).await
    }

    async fn discover(&self, session: &SessionArtifact, summary: &mut RunSummary) -> Result<Vec<ItemId>, FatalError> {
        discover(
            self.stages.session.as_ref(),
            self.stages.source.as_ref(),
            &self.state,
            session,
            summary,
        )
        .await
    }

    async fn process_all(
        &self,
        session: &SessionArtifact,
        fresh: Vec<ItemId>,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
        summary: &mut RunSummary,
    ) -> Result<(), FatalError> {
        // A fatal item failure cancels only this run's token, not the caller's.
        let run_token = cancel.child_token();
        let total = fresh.len();

        let mut outcomes = stream::iter(fresh.into_iter().enumerate())
            .map(|(i, id)| {
                let run_token = &run_token;
                async move {
                    if run_token.is_cancelled() {
                        return (id, ItemOutcome::NotStarted);
                    }
                    progress.item_started(&id, i + 1, total);
                    let outcome = match self.process_item(session, &id).await {
                        Ok(()) => ItemOutcome::Committed,
                        Err(failure) => ItemOutcome::Failed(failure),
                    };
                    progress.item_finished(&id, &outcome);
                    (id, outcome)
                }
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let mut fatal = None;
        while let Some((id, outcome)) = outcomes.next().await {
            match outcome {
                ItemOutcome::Committed => summary.succeeded += 1,
                ItemOutcome::NotStarted => summary.not_started += 1,
                ItemOutcome::Failed(failure) => {
                    warn!(item = %id, stage = %failure.stage, error = %failure.error, "item failed");
                    summary.failed += 1;
                    summary
                        .failures
                        .push((id, failure.stage.to_string(), failure.error.to_string()));

                    if let Err(cause) = failure.classify() {
                        if fatal.is_none() {
                            if matches!(cause, FatalError::Authentication(_)) {
                                self.stages.session.invalidate(session).await;
                            }
                            run_token.cancel();
                            fatal = Some(cause);
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() && summary.not_started > 0 {
            warn!(not_started = summary.not_started, "run cancelled before all items started");
        }

        match fatal {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    /// fetch → extract → enrich → render → distribute → commit.
    #[instrument(skip_all, fields(item = %id))]
    async fn process_item(&self, session: &SessionArtifact, id: &ItemId) -> Result<(), ItemFailure> {
        let raw = self
            .stages
            .source
            .fetch_full(session, id)
            .await
            .map_err(ItemFailure::at(Stage::Fetch))?;

        let record = self
            .stages
            .extractor
            .extract(&raw)
            .map_err(ItemFailure::at(Stage::Extract))?;

        let enriched = self
            .stages
            .enricher
            .enrich(record)
            .await
            .map_err(ItemFailure::at(Stage::Enrich))?;

        let artifact = self
            .stages
            .renderer
            .render(&enriched)
            .await
            .map_err(ItemFailure::at(Stage::Render))?;

        let caption = self.stages.distributor.caption(&enriched);
        self.stages
            .distributor
            .distribute(&artifact, &caption)
            .await
            .map_err(ItemFailure::at(Stage::Distribute))?;

        self.state
            .commit(id)
            .await
            .map_err(ItemFailure::at(Stage::Commit))?;

        info!(file = %artifact.file_name, "item committed");
        Ok(())
    }

    async fn flush(&self) {
        flush_stores(&self.state, self.stages.session.as_ref(), self.options.flush_timeout).await;
    }
}

/// List candidates and keep the ones not yet processed, in listing order.
async fn discover(
    provider: &dyn SessionProvider,
    source: &dyn Source,
    state: &StateStore,
    session: &SessionArtifact,
    summary: &mut RunSummary,
) -> Result<Vec<ItemId>, FatalError> {
    let candidates = match source.list_candidates(session).await {
        Ok(c) => c,
        Err(e @ QuizRelayError::SessionExpired { .. }) => {
            provider.invalidate(session).await;
            return Err(FatalError::Authentication(e));
        }
        Err(e) => return Err(FatalError::Listing(e)),
    };
    summary.discovered = candidates.len();

    let mut fresh = Vec::new();
    for id in candidates {
        if state.contains(&id).await {
            debug!(item = %id, "already processed, skipping");
        } else {
            fresh.push(id);
        }
    }
    summary.new = fresh.len();
    info!(discovered = summary.discovered, new = summary.new, "filtered candidates");
    Ok(fresh)
}

/// Seed state: commit every listed item without fetching or distributing.
///
/// Used on a fresh deployment so the first real run does not post the
/// whole back catalogue.
#[instrument(skip_all)]
pub async fn mark_all(
    provider: &dyn SessionProvider,
    source: &dyn Source,
    state: &StateStore,
    flush_timeout: Duration,
    progress: &dyn ProgressReporter,
) -> Result<usize, FatalError> {
    progress.phase("Acquiring session");
    let session = provider.acquire().await.map_err(FatalError::Authentication)?;

    progress.phase("Listing quizzes");
    let mut summary = RunSummary::new();
    let result = match discover(provider, source, state, &session, &mut summary).await {
        Ok(fresh) => {
            progress.phase("Marking quizzes as processed");
            state.commit_many(&fresh).await.map_err(FatalError::StateIntegrity)
        }
        Err(e) => Err(e),
    };

    flush_stores(state, provider, flush_timeout).await;
    if let Ok(marked) = &result {
        info!(marked, total = state.len().await, "marked all listed quizzes");
    }
    result
}

async fn flush_stores(state: &StateStore, provider: &dyn SessionProvider, timeout: Duration) {
    if !state.flush(timeout).await {
        warn!("remote state sync did not finish in time; local state is authoritative");
    }
    if !provider.flush(timeout).await {
        warn!("remote session sync did not finish in time");
    }
}
