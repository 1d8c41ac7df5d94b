//! Debounced persistence of the full game state.
//!
//! Every mutation schedules a snapshot write after a quiet period;
//! another mutation inside the window cancels and reschedules. The bridge
//! owns all write access to the persisted copy - during a session the
//! in-memory graph is the source of truth and the snapshot only ever
//! trails it by at most one quiet period.

use crate::graph::{PageId, StoryGraph};
use crate::persona::PersonaRegistry;
use crate::settings::{SessionSettings, TtsSettings};
use crate::world::WorldState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The complete persisted snapshot of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// The three persona slots.
    pub personas: PersonaRegistry,

    /// Every page across every explored branch.
    pub story_tree: StoryGraph,

    /// The displayed root-to-leaf walk, as ids into the story tree.
    pub path: Vec<PageId>,

    /// The open sheet in the book display.
    pub sheet_index: usize,

    /// Whether a story has been launched.
    pub started: bool,

    /// Session settings chosen at setup.
    pub settings: SessionSettings,

    /// Read-aloud settings.
    #[serde(default)]
    pub tts: TtsSettings,

    /// Accumulated world facts.
    #[serde(default)]
    pub world: WorldState,

    /// Unix seconds at snapshot time.
    pub timestamp: u64,
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The external blob store holding the single autosave slot.
#[async_trait]
pub trait SaveStore: Send + Sync {
    /// Overwrite the autosave slot.
    async fn save(&self, state: &GameState) -> Result<(), SaveError>;

    /// Read the autosave slot; None means no save exists.
    async fn load(&self) -> Result<Option<GameState>, SaveError>;

    /// Delete the autosave slot.
    async fn clear(&self) -> Result<(), SaveError>;
}

/// JSON file implementation of the save store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SaveStore for JsonFileStore {
    async fn save(&self, state: &GameState) -> Result<(), SaveError> {
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<GameState>, SaveError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn clear(&self) -> Result<(), SaveError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// In-memory implementation of the save store, for tests.
///
/// Stores the serialized form so save/load exercises the same JSON path
/// as the file store, and counts writes so debounce behavior is
/// observable.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
    save_count: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaveStore for MemoryStore {
    async fn save(&self, state: &GameState) -> Result<(), SaveError> {
        let content = serde_json::to_string(state)?;
        *self.slot.lock().await = Some(content);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<GameState>, SaveError> {
        match self.slot.lock().await.as_deref() {
            Some(content) => Ok(Some(serde_json::from_str(content)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<(), SaveError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// Debounced writer over a [`SaveStore`].
#[derive(Clone)]
pub struct AutosaveBridge {
    store: Arc<dyn SaveStore>,
    delay: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AutosaveBridge {
    pub fn new(store: Arc<dyn SaveStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Schedule a snapshot write after the quiet period, replacing any
    /// pending one. The snapshot closure runs when the timer fires, so
    /// the write always captures the latest state.
    pub async fn schedule<F, Fut>(&self, snapshot: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GameState> + Send + 'static,
    {
        let mut pending = self.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let store = Arc::clone(&self.store);
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let state = snapshot().await;
            if let Err(error) = store.save(&state).await {
                log::warn!("autosave failed: {error}");
            }
        }));
    }

    /// Write a snapshot immediately, cancelling any pending debounced
    /// write.
    pub async fn flush(&self, state: &GameState) -> Result<(), SaveError> {
        self.cancel_pending().await;
        self.store.save(state).await
    }

    /// Read the last-written snapshot.
    pub async fn load(&self) -> Result<Option<GameState>, SaveError> {
        self.store.load().await
    }

    /// Delete the persisted snapshot and drop any pending write.
    pub async fn clear(&self) -> Result<(), SaveError> {
        self.cancel_pending().await;
        self.store.clear().await
    }

    async fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
        }
    }
}
