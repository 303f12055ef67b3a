//! Persistence half of session reuse: restore, persist, invalidate.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use quizrelay_shared::{QuizRelayError, Result, SessionArtifact};

use crate::backend::Backend;

/// Stores the authenticated session between runs.
pub struct SessionStore {
    backend: Box<dyn Backend>,
}

impl SessionStore {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Stored session, remote copy first. Absent, unreadable, empty or
    /// invalidated sessions all yield `None`.
    #[instrument(skip_all, fields(backend = self.backend.name()))]
    pub async fn restore(&self) -> Option<SessionArtifact> {
        let bytes = match self.backend.load().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no stored session");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to read stored session");
                return None;
            }
        };

        let artifact = match parse_artifact(&bytes) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "stored session is unreadable");
                return None;
            }
        };

        if !artifact.valid {
            info!("stored session was invalidated");
            return None;
        }
        if artifact.is_empty() {
            debug!("stored session has no cookies");
            return None;
        }
        info!(created_at = %artifact.created_at, "restored session");
        Some(artifact)
    }

    /// Whether `bytes` holds a usable session. Used as the remote payload
    /// check so an empty or foreign body never replaces the local session.
    pub fn accepts(bytes: &[u8]) -> bool {
        parse_artifact(bytes).is_ok_and(|artifact| !artifact.is_empty())
    }

    /// Save locally; the remote copy follows in the background.
    pub async fn persist(&self, artifact: &SessionArtifact) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(artifact)
            .map_err(|e| QuizRelayError::Storage(format!("failed to serialize session: {e}")))?;
        self.backend.save(&bytes).await
    }

    /// Mark `artifact` unusable so the next run logs in again.
    pub async fn invalidate(&self, artifact: &SessionArtifact) -> Result<()> {
        let mut stale = artifact.clone();
        stale.valid = false;
        self.persist(&stale).await?;
        info!("session invalidated");
        Ok(())
    }

    pub async fn flush(&self, timeout: Duration) -> bool {
        self.backend.flush(timeout).await
    }
}

/// Accepts the current layout or a bare `{name: value}` cookie map.
fn parse_artifact(bytes: &[u8]) -> Result<SessionArtifact> {
    if let Ok(artifact) = serde_json::from_slice::<SessionArtifact>(bytes) {
        return Ok(artifact);
    }
    let cookies: BTreeMap<String, String> = serde_json::from_slice(bytes)
        .map_err(|e| QuizRelayError::parse(format!("session document: {e}")))?;
    Ok(SessionArtifact::new(cookies))
}
