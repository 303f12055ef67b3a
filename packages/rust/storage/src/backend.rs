//! Storage backends for small JSON documents.
//!
//! A [`Backend`] loads and saves one opaque blob. Two media implement it:
//! [`LocalFileBackend`] (atomic write-temp-then-rename) and [`GistBackend`]
//! (a file inside a GitHub Gist). [`FallbackBackend`] composes them: reads
//! prefer the remote copy, writes land locally first and reach the remote
//! through a background sync task that never blocks the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use quizrelay_shared::{QuizRelayError, RemoteTarget, Result};

const USER_AGENT: &str = concat!("quizrelay/", env!("CARGO_PKG_VERSION"));

/// A place a single JSON document can be loaded from and saved to.
///
/// Callers serialize `save` calls; implementations need not.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    async fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for deferred writes. Returns `false` if some did not settle.
    async fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// LocalFileBackend
// ---------------------------------------------------------------------------

/// A JSON file on the local disk.
pub struct LocalFileBackend {
    path: PathBuf,
    name: String,
}

impl LocalFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".into());
        self.path.with_file_name(format!(".{file_name}.tmp"))
    }
}

#[async_trait]
impl Backend for LocalFileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QuizRelayError::io(&self.path, e)),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QuizRelayError::io(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| QuizRelayError::io(&temp, e))?;

        // Atomic rename
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| QuizRelayError::io(&self.path, e))?;

        debug!(path = %self.path.display(), size = bytes.len(), "wrote local file");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GistBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    files: std::collections::HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

/// One file inside a GitHub Gist, read with GET and written with PATCH.
pub struct GistBackend {
    client: Client,
    api_base: String,
    token: String,
    gist_id: String,
    file_name: String,
    name: String,
}

impl GistBackend {
    pub fn new(target: &RemoteTarget, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| QuizRelayError::Remote(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: target.api_base.trim_end_matches('/').to_string(),
            token: target.token.clone(),
            gist_id: target.gist_id.clone(),
            file_name: target.file_name.clone(),
            name: format!("gist:{}", target.file_name),
        })
    }

    fn gist_url(&self) -> String {
        format!("{}/gists/{}", self.api_base, self.gist_id)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
    }

    async fn fetch_raw(&self, raw_url: &str) -> Result<String> {
        let response = self
            .authorized(self.client.get(raw_url))
            .send()
            .await
            .map_err(|e| QuizRelayError::Remote(format!("{raw_url}: {e}")))?;
        if !response.status().is_success() {
            return Err(QuizRelayError::Remote(format!(
                "{raw_url}: HTTP {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| QuizRelayError::Remote(format!("{raw_url}: body read failed: {e}")))
    }
}

#[async_trait]
impl Backend for GistBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(backend = %self.name))]
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let url = self.gist_url();
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| QuizRelayError::Remote(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
            info!(status = status.as_u16(), "gist not available, treating as absent");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(QuizRelayError::Remote(format!("{url}: HTTP {status}")));
        }

        let gist: GistResponse = response
            .json()
            .await
            .map_err(|e| QuizRelayError::Remote(format!("{url}: malformed gist response: {e}")))?;

        let Some(file) = gist.files.get(&self.file_name) else {
            debug!(file = %self.file_name, "file not present in gist");
            return Ok(None);
        };

        let content = match (&file.content, file.truncated, &file.raw_url) {
            (_, true, Some(raw_url)) => self.fetch_raw(raw_url).await?,
            (Some(content), _, _) => content.clone(),
            (None, _, _) => return Ok(None),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(content.into_bytes()))
    }

    #[instrument(skip_all, fields(backend = %self.name, size = bytes.len()))]
    async fn save(&self, bytes: &[u8]) -> Result<()> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| QuizRelayError::Remote(format!("payload is not UTF-8: {e}")))?;

        let mut files = serde_json::Map::new();
        files.insert(
            self.file_name.clone(),
            serde_json::json!({ "content": content }),
        );
        let body = serde_json::json!({ "files": files });

        let url = self.gist_url();
        let response = self
            .authorized(self.client.patch(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| QuizRelayError::Remote(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizRelayError::Remote(format!("{url}: HTTP {status}")));
        }

        debug!("saved to gist");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FallbackBackend
// ---------------------------------------------------------------------------

/// Decides whether a remote payload is a usable document. Rejected payloads
/// are handled like an unreachable remote: the local copy is read and left
/// untouched.
pub type PayloadCheck = fn(&[u8]) -> bool;

fn is_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
}

/// Latest snapshot awaiting remote sync, tagged with a generation number.
type Pending = Option<(u64, Arc<Vec<u8>>)>;

struct RemoteSync {
    remote: Arc<dyn Backend>,
    pending: watch::Sender<Pending>,
    synced: watch::Receiver<u64>,
}

/// Local file as the durable copy, optional remote as the preferred read source.
///
/// - `load`: remote first. A payload that passes the [`PayloadCheck`] is also
///   written to the local file as a cache. Remote errors, absence or rejected
///   payloads fall back to the local file.
/// - `save`: local write first (its failure is returned), then the snapshot
///   is handed to a background task that pushes it to the remote. Only the
///   newest snapshot is pushed; remote failures are logged.
pub struct FallbackBackend {
    local: Box<dyn Backend>,
    sync: Option<RemoteSync>,
    accept: PayloadCheck,
    name: String,
}

impl FallbackBackend {
    /// Must be called within a Tokio runtime when `remote` is set.
    pub fn new(local: Box<dyn Backend>, remote: Option<Arc<dyn Backend>>) -> Self {
        let name = match &remote {
            Some(r) => format!("{} + {}", local.name(), r.name()),
            None => local.name().to_string(),
        };

        let sync = remote.map(|remote| {
            let (pending_tx, pending_rx) = watch::channel::<Pending>(None);
            let (synced_tx, synced_rx) = watch::channel(0u64);
            tokio::spawn(sync_worker(Arc::clone(&remote), pending_rx, synced_tx));
            RemoteSync {
                remote,
                pending: pending_tx,
                synced: synced_rx,
            }
        });

        Self {
            local,
            sync,
            accept: is_json,
            name,
        }
    }

    /// Replace the default "any JSON" check on remote payloads.
    pub fn with_payload_check(mut self, accept: PayloadCheck) -> Self {
        self.accept = accept;
        self
    }

    pub fn local_only(local: Box<dyn Backend>) -> Self {
        Self::new(local, None)
    }

    pub fn has_remote(&self) -> bool {
        self.sync.is_some()
    }
}

async fn sync_worker(
    remote: Arc<dyn Backend>,
    mut pending: watch::Receiver<Pending>,
    synced: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let latest = pending.borrow_and_update().clone();
        let Some((generation, bytes)) = latest else {
            continue;
        };

        match remote.save(&bytes).await {
            Ok(()) => debug!(backend = remote.name(), generation, "remote sync complete"),
            Err(e) => warn!(backend = remote.name(), error = %e, "remote sync failed"),
        }
        // Settled either way; a failed snapshot is superseded by the next save.
        let _ = synced.send(generation);
    }
}

#[async_trait]
impl Backend for FallbackBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        if let Some(sync) = &self.sync {
            let remote = sync.remote.name();
            match sync.remote.load().await {
                Ok(Some(bytes)) if (self.accept)(&bytes) => {
                    if let Err(e) = self.local.save(&bytes).await {
                        warn!(backend = remote, error = %e, "failed to cache remote copy locally");
                    }
                    info!(backend = remote, "loaded from remote");
                    return Ok(Some(bytes));
                }
                Ok(Some(_)) => warn!(backend = remote, "remote payload rejected, using local copy"),
                Ok(None) => info!(backend = remote, "nothing stored remotely, using local copy"),
                Err(e) => warn!(backend = remote, error = %e, "remote load failed, using local copy"),
            }
        }
        self.local.load().await
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        self.local.save(bytes).await?;

        if let Some(sync) = &self.sync {
            let snapshot = Arc::new(bytes.to_vec());
            sync.pending.send_modify(|slot| {
                let generation = slot.as_ref().map_or(1, |(g, _)| g + 1);
                *slot = Some((generation, snapshot));
            });
        }
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> bool {
        let Some(sync) = &self.sync else {
            return true;
        };
        let target = sync.pending.borrow().as_ref().map_or(0, |(g, _)| *g);
        let mut synced = sync.synced.clone();

        match tokio::time::timeout(timeout, synced.wait_for(|done| *done >= target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => {
                warn!(backend = %self.name, "remote sync task stopped before flushing");
                false
            }
            Err(_) => {
                warn!(backend = %self.name, ?timeout, "timed out waiting for remote sync");
                false
            }
        }
    }
}

/// Build the backend for one document: local file plus the remote target, if any.
///
/// `accept` validates remote payloads before they replace the local copy.
pub fn build_backend(
    local_path: &Path,
    remote: Option<&RemoteTarget>,
    timeout: Duration,
    accept: PayloadCheck,
) -> Result<FallbackBackend> {
    let local = Box::new(LocalFileBackend::new(local_path));
    let remote = match remote {
        Some(target) => Some(Arc::new(GistBackend::new(target, timeout)?) as Arc<dyn Backend>),
        None => None,
    };
    Ok(FallbackBackend::new(local, remote).with_payload_check(accept))
}
