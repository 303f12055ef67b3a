//! Processed-item state: which identifiers have been fully distributed.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use quizrelay_shared::{ItemId, ProcessedSet, QuizRelayError, Result, StateDocument};

use crate::backend::Backend;

/// Authoritative record of processed identifiers.
///
/// The in-memory set answers membership; every mutation is persisted through
/// the backend before it returns. The mutex is held across the write so
/// concurrent commits reach the file one at a time.
pub struct StateStore {
    backend: Box<dyn Backend>,
    set: Mutex<ProcessedSet>,
}

impl StateStore {
    /// Load state from the backend. Never fails: unreadable or corrupt
    /// state is logged and treated as a first run.
    #[instrument(skip_all, fields(backend = backend.name()))]
    pub async fn load(backend: Box<dyn Backend>) -> Self {
        let set = match backend.load().await {
            Ok(Some(bytes)) => match serde_json::from_slice::<StateDocument>(&bytes) {
                Ok(doc) => ProcessedSet::from(doc),
                Err(e) => {
                    warn!(error = %e, "state document is corrupt, starting empty");
                    ProcessedSet::new()
                }
            },
            Ok(None) => {
                info!("no stored state, treating as first run");
                ProcessedSet::new()
            }
            Err(e) => {
                warn!(error = %e, "failed to read state, starting empty");
                ProcessedSet::new()
            }
        };

        info!(processed = set.len(), "state loaded");
        Self {
            backend,
            set: Mutex::new(set),
        }
    }

    /// Whether `bytes` is a state document. Used as the remote payload check
    /// so a well-formed but foreign JSON body never replaces local history.
    pub fn accepts(bytes: &[u8]) -> bool {
        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value::<StateDocument>(value).is_ok()
            }
            _ => false,
        }
    }

    pub async fn contains(&self, id: &ItemId) -> bool {
        self.set.lock().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.set.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.set.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> ProcessedSet {
        self.set.lock().await.clone()
    }

    /// Record `id` as processed and persist locally before returning.
    ///
    /// Returns `Ok(false)` if it was already recorded (nothing is written).
    /// On a local write failure the insert is rolled back and the error
    /// returned; the caller must stop processing.
    #[instrument(skip_all, fields(item = %id))]
    pub async fn commit(&self, id: &ItemId) -> Result<bool> {
        let mut set = self.set.lock().await;
        if !set.insert(id.clone()) {
            debug!("already committed");
            return Ok(false);
        }

        if let Err(e) = self.persist(&set).await {
            set.remove(id);
            return Err(e);
        }
        debug!(processed = set.len(), "committed");
        Ok(true)
    }

    /// Record many identifiers with a single write. Returns how many were new.
    #[instrument(skip_all)]
    pub async fn commit_many(&self, ids: &[ItemId]) -> Result<usize> {
        let mut set = self.set.lock().await;
        let added: Vec<ItemId> = ids
            .iter()
            .filter(|id| set.insert((*id).clone()))
            .cloned()
            .collect();
        if added.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&set).await {
            for id in &added {
                set.remove(id);
            }
            return Err(e);
        }
        info!(added = added.len(), processed = set.len(), "committed batch");
        Ok(added.len())
    }

    /// Wait (bounded) for the remote copy to catch up.
    pub async fn flush(&self, timeout: Duration) -> bool {
        self.backend.flush(timeout).await
    }

    async fn persist(&self, set: &ProcessedSet) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&set.to_document())
            .map_err(|e| QuizRelayError::Storage(format!("failed to serialize state: {e}")))?;
        self.backend.save(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::tests::{MemoryBackend, temp_dir};
    use crate::backend::{FallbackBackend, LocalFileBackend};

    fn id(s: &str) -> ItemId {
        ItemId::from(s)
    }

    #[tokio::test]
    async fn commit_persists_sorted_document() {
        let dir = temp_dir();
        let path = dir.join("scraped_urls.json");
        let store = StateStore::load(Box::new(LocalFileBackend::new(&path))).await;
        assert!(store.is_empty().await);

        assert!(store.commit(&id("https://q/b")).await.expect("commit"));
        assert!(store.commit(&id("https://q/a")).await.expect("commit"));

        let doc: StateDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(doc.processed_urls, vec![id("https://q/a"), id("https://q/b")]);

        // A fresh store sees the committed items.
        let reloaded = StateStore::load(Box::new(LocalFileBackend::new(&path))).await;
        assert!(reloaded.contains(&id("https://q/a")).await);
        assert_eq!(reloaded.len().await, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn commit_is_idempotent() {
        let backend = Arc::new(MemoryBackend::default());
        let store = StateStore::load(Box::new(ArcBackend(Arc::clone(&backend)))).await;

        assert!(store.commit(&id("a")).await.expect("first"));
        assert!(!store.commit(&id("a")).await.expect("second"));
        assert_eq!(backend.saves.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_state_loads_empty() {
        let store = StateStore::load(Box::new(MemoryBackend::with("{not json"))).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remote_error_returns_local_contents() {
        let local = MemoryBackend::with(r#"{"processed_urls":["a","b"]}"#);
        let remote = MemoryBackend {
            fail_load: true,
            ..Default::default()
        };
        let backend = FallbackBackend::new(Box::new(local), Some(Arc::new(remote)));
        let store = StateStore::load(Box::new(backend)).await;

        let expected: ProcessedSet = [id("a"), id("b")].into_iter().collect();
        assert_eq!(store.snapshot().await, expected);
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let backend = Arc::new(MemoryBackend::default());
        let store = StateStore::load(Box::new(ArcBackend(Arc::clone(&backend)))).await;
        backend
            .fail_save
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(store.commit(&id("a")).await.is_err());
        assert!(!store.contains(&id("a")).await);
        assert!(store.commit_many(&[id("b"), id("c")]).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn commit_many_counts_new_items() {
        let store = StateStore::load(Box::new(MemoryBackend::with(
            r#"{"processed_urls":["a"]}"#,
        )))
        .await;
        let added = store
            .commit_many(&[id("a"), id("b"), id("c")])
            .await
            .expect("commit");
        assert_eq!(added, 2);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn concurrent_commits_are_all_persisted() {
        let dir = temp_dir();
        let path = dir.join("state.json");
        let store = Arc::new(StateStore::load(Box::new(LocalFileBackend::new(&path))).await);

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.commit(&ItemId::new(format!("item-{n:02}"))).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("commit");
        }

        let doc: StateDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(doc.processed_urls.len(), 16);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn foreign_remote_payload_keeps_local_history() {
        let dir = temp_dir();
        let path = dir.join("scraped_urls.json");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(&path, r#"{"processed_urls":["A","B"]}"#).expect("seed");

        let remote = Arc::new(MemoryBackend::with(r#"["rate limited"]"#));
        let backend = FallbackBackend::new(
            Box::new(LocalFileBackend::new(&path)),
            Some(remote as Arc<dyn Backend>),
        )
        .with_payload_check(StateStore::accepts);
        let store = StateStore::load(Box::new(backend)).await;

        assert!(store.contains(&id("A")).await);
        assert!(store.contains(&id("B")).await);

        store.commit(&id("C")).await.expect("commit");
        let doc: StateDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(doc.processed_urls, vec![id("A"), id("B"), id("C")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn accepts_only_state_documents() {
        assert!(StateStore::accepts(br#"{"processed_urls":["a"]}"#));
        assert!(!StateStore::accepts(br#"["rate limited"]"#));
        assert!(!StateStore::accepts(br#"{"processed_urls":"a"}"#));
        assert!(!StateStore::accepts(b"<html></html>"));
    }

    /// Lets a test keep a handle on the backend the store owns.
    struct ArcBackend(Arc<MemoryBackend>);

    #[async_trait::async_trait]
    impl Backend for ArcBackend {
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn load(&self) -> Result<Option<Vec<u8>>> {
            self.0.load().await
        }
        async fn save(&self, bytes: &[u8]) -> Result<()> {
            self.0.save(bytes).await
        }
    }
}
