//! ComicSession - the primary public API for a generated comic.
//!
//! This module provides a clean, high-level interface wrapping the
//! orchestrator, story graph, autosave bridge, and event stream into a
//! single type the rendering layer drives.
//!
//! # Example
//!
//! ```ignore
//! use comic_core::{ComicSession, SessionConfig, PersonaSlot};
//! use comic_core::autosave::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileStore::new("autosave.json"));
//!     let mut session = ComicSession::from_env(store, SessionConfig::default())?;
//!
//!     session.create_persona(PersonaSlot::Hero, "A classic comic book hero").await?;
//!     session.launch().await?;
//!
//!     // Later, when the reader picks a branch:
//!     session.resolve_choice(3, "Fight").await;
//!     Ok(())
//! }
//! ```

use crate::autosave::{AutosaveBridge, SaveError, SaveStore};
use crate::backend::{BackendError, BiosRequest, ChatRequest, StoryBackend};
use crate::gemini_backend::GeminiBackend;
use crate::graph::{Bubble, Page, PageId, PageType};
use crate::orchestrator::{
    Orchestrator, SessionEvent, SessionState, DEFAULT_VIDEO_POLL_INTERVAL,
    DEFAULT_VIDEO_POLL_LIMIT,
};
use crate::persona::{Persona, PersonaRegistry, PersonaSlot};
use crate::retry::{with_backoff, RetryPolicy};
use crate::settings::{is_decision_page, SessionSettings, TtsSettings};
use crate::world::WorldState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a hero persona is required before launch")]
    NoHero,

    #[error("the story has already been launched")]
    AlreadyStarted,

    #[error("no such page in the current story")]
    UnknownPage,

    #[error("persona slot '{0}' is empty")]
    MissingPersona(PersonaSlot),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("save error: {0}")]
    Save(#[from] SaveError),
}

/// Configuration for creating a comic session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Story settings chosen at setup.
    pub settings: SessionSettings,

    /// Read-aloud settings.
    pub tts: TtsSettings,

    /// Quiet period before a debounced autosave write.
    pub autosave_delay: Duration,

    /// Retry policy applied to every backend call.
    pub retry: RetryPolicy,

    /// Video poll cadence.
    pub video_poll_interval: Duration,

    /// Maximum video polls before the animation is declared failed.
    pub video_poll_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settings: SessionSettings::default(),
            tts: TtsSettings::default(),
            autosave_delay: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            video_poll_interval: DEFAULT_VIDEO_POLL_INTERVAL,
            video_poll_limit: DEFAULT_VIDEO_POLL_LIMIT,
        }
    }
}

impl SessionConfig {
    /// Set the story settings.
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the read-aloud settings.
    pub fn with_tts(mut self, tts: TtsSettings) -> Self {
        self.tts = tts;
        self
    }

    /// Set the autosave quiet period.
    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    /// Set the backend retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the video poll cadence and bound.
    pub fn with_video_polling(mut self, interval: Duration, limit: u32) -> Self {
        self.video_poll_interval = interval;
        self.video_poll_limit = limit;
        self
    }
}

/// An interactive generated comic session.
///
/// This is the main entry point. It manages:
/// - The branching story graph and the displayed path
/// - The generation orchestrator and its backend
/// - Debounced autosave persistence
/// - Events that need the embedding application (re-auth, narration audio)
pub struct ComicSession {
    orchestrator: Orchestrator,
    state: Arc<Mutex<SessionState>>,
    autosave: AutosaveBridge,
    backend: Arc<dyn StoryBackend>,
    retry: RetryPolicy,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ComicSession {
    /// Create a session over the given backend and save store.
    pub fn new(
        backend: Arc<dyn StoryBackend>,
        store: Arc<dyn SaveStore>,
        config: SessionConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(SessionState::new(config.settings, config.tts)));
        let autosave = AutosaveBridge::new(store, config.autosave_delay);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend),
            Arc::clone(&state),
            autosave.clone(),
            events_tx,
            config.retry,
        )
        .with_video_polling(config.video_poll_interval, config.video_poll_limit);

        Self {
            orchestrator,
            state,
            autosave,
            backend,
            retry: config.retry,
            events: events_rx,
        }
    }

    /// Create a session backed by Gemini, using the GEMINI_API_KEY
    /// environment variable.
    pub fn from_env(store: Arc<dyn SaveStore>, config: SessionConfig) -> Result<Self, SessionError> {
        let backend = GeminiBackend::from_env()?;
        Ok(Self::new(Arc::new(backend), store, config))
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Set or clear a persona slot directly (e.g. from an upload).
    pub async fn set_persona(&self, slot: PersonaSlot, persona: Option<Persona>) {
        self.state.lock().await.personas.set(slot, persona);
    }

    /// Generate a persona portrait from a description and store it in the
    /// slot.
    pub async fn create_persona(
        &self,
        slot: PersonaSlot,
        desc: &str,
    ) -> Result<Persona, SessionError> {
        let (art_style, genre) = {
            let state = self.state.lock().await;
            (state.settings.art_style.clone(), state.settings.genre.clone())
        };

        let backend = Arc::clone(&self.backend);
        let persona = with_backoff(&self.retry, || {
            backend.generate_persona(desc, &art_style, &genre)
        })
        .await?;
        self.state.lock().await.personas.set(slot, Some(persona.clone()));
        Ok(persona)
    }

    /// Generate names and backstories for every populated persona slot in
    /// one batch call, merging them around the existing portraits.
    pub async fn generate_bios(&self) -> Result<(), SessionError> {
        let request = {
            let state = self.state.lock().await;
            if !state.personas.has_hero() {
                return Err(SessionError::NoHero);
            }
            BiosRequest {
                genre: state.settings.genre.clone(),
                tone: state.settings.tone.clone(),
                language: state.settings.language_name().to_string(),
                has_friend: state.personas.friend.is_some(),
                has_villain: state.personas.villain.is_some(),
            }
        };

        let backend = Arc::clone(&self.backend);
        let bios = with_backoff(&self.retry, || backend.generate_bios(&request)).await?;
        self.state.lock().await.personas.apply_bios(&bios);
        Ok(())
    }

    // ========================================================================
    // Story flow
    // ========================================================================

    /// Start the story: creates the cover and the first story page in
    /// their loading state and kicks off both generations concurrently,
    /// with no ordering between them. Requires a hero persona.
    ///
    /// Returns the (cover, first page) ids.
    pub async fn launch(&self) -> Result<(PageId, PageId), SessionError> {
        let (cover_id, first_id) = {
            let mut state = self.state.lock().await;
            if !state.personas.has_hero() {
                return Err(SessionError::NoHero);
            }
            if state.started {
                return Err(SessionError::AlreadyStarted);
            }

            let cover = Page::new(PageId::new(), PageType::Cover, 0);
            let mut first = Page::child_of(PageId::new(), PageType::Story, 1, cover.id, None);
            first.is_decision_page = is_decision_page(1);
            let ids = (cover.id, first.id);

            state.path = vec![ids.0, ids.1];
            state.graph.insert(cover);
            state.graph.insert(first);
            state.started = true;
            ids
        };

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.generate_page(cover_id, 0, PageType::Cover).await;
        });
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.generate_page(first_id, 1, PageType::Story).await;
        });

        Ok((cover_id, first_id))
    }

    /// Resolve the reader's choice on the page at `page_index` of the
    /// displayed path and generate what follows. Completes when the new
    /// page (or the ending pair) has finished generating.
    pub async fn resolve_choice(&self, page_index: u32, choice: &str) {
        self.orchestrator.resolve_choice(page_index, choice).await;
    }

    /// Jump the displayed path to an arbitrary explored node.
    pub async fn jump_to_node(&self, page_id: PageId) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            let path = state.graph.path_from(page_id);
            if path.is_empty() {
                return Err(SessionError::UnknownPage);
            }
            let page_index = state
                .graph
                .get(page_id)
                .map(|page| page.page_index)
                .unwrap_or(0);
            state.path = path;
            state.sheet_index = ((page_index + 1) / 2) as usize;
        }
        self.orchestrator.schedule_autosave().await;
        Ok(())
    }

    /// Re-render a page's artwork from its existing beat.
    pub async fn regenerate_image(&self, page_id: PageId) {
        self.orchestrator.regenerate_image(page_id).await;
    }

    /// Rewrite a page's beat per a reader instruction.
    pub async fn revise_beat(&self, page_id: PageId, instruction: &str) {
        self.orchestrator.revise_beat(page_id, instruction).await;
    }

    /// Edit a page's artwork per a reader instruction.
    pub async fn remix_image(&self, page_id: PageId, instruction: &str) {
        self.orchestrator.remix_image(page_id, instruction).await;
    }

    /// Animate a page's artwork into a short clip.
    pub async fn animate_page(&self, page_id: PageId) {
        self.orchestrator.animate_page(page_id).await;
    }

    /// Replace a page's bubbles with reader-edited ones. Goes through the
    /// same merge path as generated updates, so a stale id after a reset
    /// is a silent no-op.
    pub async fn update_bubbles(&self, page_id: PageId, bubbles: Vec<Bubble>) {
        {
            let mut state = self.state.lock().await;
            state.graph.update(page_id, move |page| page.bubbles = bubbles);
        }
        self.orchestrator.schedule_autosave().await;
    }

    /// Synthesize speech for arbitrary text, using the configured default
    /// voice unless one is given. Returns base64 audio.
    pub async fn read_aloud(
        &self,
        text: &str,
        voice: Option<&str>,
    ) -> Result<String, SessionError> {
        let voice = match voice {
            Some(voice) => voice.to_string(),
            None => self.state.lock().await.tts.default_voice.clone(),
        };

        let backend = Arc::clone(&self.backend);
        Ok(with_backoff(&self.retry, || backend.generate_speech(text, &voice)).await?)
    }

    /// Ask a persona to reply in character to the reader, grounded in the
    /// latest scene on the displayed path.
    pub async fn chat_with_character(
        &self,
        slot: PersonaSlot,
        message: &str,
    ) -> Result<String, SessionError> {
        let request = {
            let state = self.state.lock().await;
            let persona = state
                .personas
                .get(slot)
                .cloned()
                .ok_or(SessionError::MissingPersona(slot))?;
            let scene = state
                .path
                .iter()
                .rev()
                .filter_map(|id| state.graph.get(*id))
                .find_map(|page| page.narrative.as_ref().map(|beat| beat.scene.clone()))
                .unwrap_or_default();
            ChatRequest {
                persona,
                role: slot.role().to_string(),
                message: message.to_string(),
                scene,
                genre: state.settings.genre.clone(),
                language: state.settings.language_name().to_string(),
            }
        };

        let backend = Arc::clone(&self.backend);
        Ok(with_backoff(&self.retry, || backend.character_reply(&request)).await?)
    }

    // ========================================================================
    // Persistence and lifecycle
    // ========================================================================

    /// Write a snapshot immediately, bypassing the debounce.
    pub async fn save_now(&self) -> Result<(), SessionError> {
        let snapshot = self.state.lock().await.snapshot();
        self.autosave.flush(&snapshot).await?;
        Ok(())
    }

    /// Whether a resumable save exists.
    pub async fn has_save(&self) -> Result<bool, SessionError> {
        Ok(self
            .autosave
            .load()
            .await?
            .map(|saved| saved.started && !saved.path.is_empty())
            .unwrap_or(false))
    }

    /// Restore the last snapshot. Returns false when no save exists.
    pub async fn resume(&self) -> Result<bool, SessionError> {
        let Some(saved) = self.autosave.load().await? else {
            return Ok(false);
        };
        *self.state.lock().await = SessionState::restore(saved);
        Ok(true)
    }

    /// Full new-game reset: clears the persisted snapshot and all
    /// in-memory state. Results from abandoned generations land on an
    /// empty graph and are discarded.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.autosave.clear().await?;
        self.state.lock().await.reset();
        Ok(())
    }

    // ========================================================================
    // State queries
    // ========================================================================

    /// The displayed path, root to leaf.
    pub async fn current_path(&self) -> Vec<Page> {
        self.state.lock().await.path_pages()
    }

    /// A single page by id, from any branch.
    pub async fn page(&self, page_id: PageId) -> Option<Page> {
        self.state.lock().await.graph.get(page_id).cloned()
    }

    /// All explored children of a page, for the map view.
    pub async fn children_of(&self, page_id: PageId) -> Vec<Page> {
        self.state
            .lock()
            .await
            .graph
            .children_of(page_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every page across every branch, for the map view.
    pub async fn story_tree(&self) -> Vec<Page> {
        self.state.lock().await.graph.iter().cloned().collect()
    }

    pub async fn world_state(&self) -> WorldState {
        self.state.lock().await.world.clone()
    }

    pub async fn personas(&self) -> PersonaRegistry {
        self.state.lock().await.personas.clone()
    }

    pub async fn settings(&self) -> SessionSettings {
        self.state.lock().await.settings.clone()
    }

    /// Replace the story settings. Persisted on the next autosave.
    pub async fn set_settings(&self, settings: SessionSettings) {
        self.state.lock().await.settings = settings;
        self.orchestrator.schedule_autosave().await;
    }

    pub async fn tts_settings(&self) -> TtsSettings {
        self.state.lock().await.tts.clone()
    }

    /// Replace the read-aloud settings. Persisted on the next autosave.
    pub async fn set_tts_settings(&self, tts: TtsSettings) {
        self.state.lock().await.tts = tts;
        self.orchestrator.schedule_autosave().await;
    }

    pub async fn sheet_index(&self) -> usize {
        self.state.lock().await.sheet_index
    }

    /// Move the book display to a sheet. Persisted on the next autosave.
    pub async fn set_sheet_index(&self, sheet_index: usize) {
        self.state.lock().await.sheet_index = sheet_index;
        self.orchestrator.schedule_autosave().await;
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.started
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Wait for the next session event. None means the session is being
    /// torn down.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Poll for a session event without waiting.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// The underlying orchestrator, for advanced use.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
