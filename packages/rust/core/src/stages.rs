//! Stage interfaces consumed by the orchestrator, and their production bindings.
//!
//! Each stage is a small trait so the orchestrator can be driven by in-memory
//! fakes in tests.

use std::time::Duration;

use async_trait::async_trait;

use quizrelay_extract::QuizExtractor;
use quizrelay_render::DocumentRenderer;
use quizrelay_shared::{
    Artifact, EnrichedRecord, ItemId, QuizRecord, RawContent, Result, SessionArtifact,
};
use quizrelay_source::{SessionManager, SourceClient};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Hands out a validated session and records its invalidation.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<SessionArtifact>;
    async fn invalidate(&self, session: &SessionArtifact);
    /// Wait for pending remote syncs. Returns false on timeout.
    async fn flush(&self, timeout: Duration) -> bool;
}

#[async_trait]
pub trait Source: Send + Sync {
    async fn list_candidates(&self, session: &SessionArtifact) -> Result<Vec<ItemId>>;
    async fn fetch_full(&self, session: &SessionArtifact, id: &ItemId) -> Result<RawContent>;
}

/// Deterministic: identical input yields an identical record.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &RawContent) -> Result<QuizRecord>;
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, record: QuizRecord) -> Result<EnrichedRecord>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, record: &EnrichedRecord) -> Result<Artifact>;
}

#[async_trait]
pub trait Distributor: Send + Sync {
    fn caption(&self, record: &EnrichedRecord) -> String;
    /// Size-limit violations come back as `SizeLimit`, not as transport errors.
    async fn distribute(&self, artifact: &Artifact, caption: &str) -> Result<()>;
}

/// The full set of stages one run needs.
pub struct Stages {
    pub session: Box<dyn SessionProvider>,
    pub source: Box<dyn Source>,
    pub extractor: Box<dyn Extractor>,
    pub enricher: Box<dyn Enricher>,
    pub renderer: Box<dyn Renderer>,
    pub distributor: Box<dyn Distributor>,
}

// ---------------------------------------------------------------------------
// Production bindings
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionProvider for SessionManager {
    async fn acquire(&self) -> Result<SessionArtifact> {
        SessionManager::acquire(self).await
    }

    async fn invalidate(&self, session: &SessionArtifact) {
        SessionManager::invalidate(self, session).await;
    }

    async fn flush(&self, timeout: Duration) -> bool {
        SessionManager::flush(self, timeout).await
    }
}

#[async_trait]
impl Source for SourceClient {
    async fn list_candidates(&self, session: &SessionArtifact) -> Result<Vec<ItemId>> {
        SourceClient::list_candidates(self, session).await
    }

    async fn fetch_full(&self, session: &SessionArtifact, id: &ItemId) -> Result<RawContent> {
        SourceClient::fetch_full(self, session, id).await
    }
}

impl Extractor for QuizExtractor {
    fn extract(&self, raw: &RawContent) -> Result<QuizRecord> {
        QuizExtractor::extract(self, raw)
    }
}

#[async_trait]
impl Renderer for DocumentRenderer {
    async fn render(&self, record: &EnrichedRecord) -> Result<Artifact> {
        DocumentRenderer::render(self, record).await
    }
}
