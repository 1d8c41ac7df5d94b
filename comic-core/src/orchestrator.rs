//! The generation orchestrator.
//!
//! The central state machine driving page production. For each requested
//! page it decides the page type's pipeline, builds request payloads from
//! the world state, persona registry, and ancestor history, invokes the
//! backend, and merges results back into the story graph. An in-flight
//! guard keyed by page index keeps duplicate requests for the same slot
//! from ever reaching the backend; different indices generate fully in
//! parallel.
//!
//! Failures stay local to their page: the loading flag is cleared on every
//! exit path, credential failures surface a re-auth event, and everything
//! else is logged and left for a manual retry.

use crate::autosave::{unix_timestamp, AutosaveBridge, GameState};
use crate::backend::{BackendError, HistoryEntry, ImageRequest, PageContext, StoryBackend};
use crate::beat::Beat;
use crate::gemini_backend::BACK_COVER_SCENE;
use crate::graph::{Page, PageId, PageType, StoryGraph};
use crate::persona::PersonaRegistry;
use crate::retry::{with_backoff, RetryPolicy};
use crate::settings::{
    is_decision_page, SessionSettings, TtsSettings, BACK_COVER_PAGE, LETTERS_PAGE,
    MAX_STORY_PAGES,
};
use crate::world::WorldState;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// How often a pending video generation is polled.
pub const DEFAULT_VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// How many polls before a video generation is declared failed.
pub const DEFAULT_VIDEO_POLL_LIMIT: u32 = 90;

/// Events surfaced to the embedding application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Credentials were rejected mid-generation; the reader must
    /// re-authenticate before retrying.
    ReauthRequired,

    /// Detached narration finished for a page.
    NarrationReady { page_id: PageId, audio: String },
}

/// All mutable session state: the graph, the displayed path, world facts,
/// personas, and settings. Mutated only by the orchestrator; readers get
/// snapshots.
#[derive(Debug)]
pub struct SessionState {
    pub graph: StoryGraph,
    pub path: Vec<PageId>,
    pub world: WorldState,
    pub personas: PersonaRegistry,
    pub settings: SessionSettings,
    pub tts: TtsSettings,
    pub sheet_index: usize,
    pub started: bool,
}

impl SessionState {
    pub fn new(settings: SessionSettings, tts: TtsSettings) -> Self {
        Self {
            graph: StoryGraph::new(),
            path: Vec::new(),
            world: WorldState::default(),
            personas: PersonaRegistry::new(),
            settings,
            tts,
            sheet_index: 0,
            started: false,
        }
    }

    /// Wipe everything back to a fresh setup. In-flight results targeting
    /// the old graph become silent no-ops.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.path.clear();
        self.world = WorldState::default();
        self.personas.clear();
        self.sheet_index = 0;
        self.started = false;
    }

    /// The id of the page at `page_index` on the displayed path.
    pub fn page_on_path(&self, page_index: u32) -> Option<PageId> {
        self.path
            .iter()
            .copied()
            .find(|id| {
                self.graph
                    .get(*id)
                    .is_some_and(|page| page.page_index == page_index)
            })
    }

    /// A cloned view of the displayed path, root to leaf.
    pub fn path_pages(&self) -> Vec<Page> {
        self.path
            .iter()
            .filter_map(|id| self.graph.get(*id).cloned())
            .collect()
    }

    /// Build the beat request context for a page already on the path.
    ///
    /// History covers every narrated ancestor on the path, oldest to
    /// newest, carrying scene, resolved choice, and bubbles so the
    /// backend can hold dialogue continuity.
    pub(crate) fn beat_context(&self, page_id: PageId, page_index: u32) -> PageContext {
        let position = self
            .path
            .iter()
            .position(|id| *id == page_id)
            .unwrap_or(self.path.len());
        let history = self.path[..position]
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .filter_map(|page| {
                page.narrative.as_ref().map(|beat| HistoryEntry {
                    page_index: page.page_index,
                    scene: beat.scene.clone(),
                    resolved_choice: page.resolved_choice.clone(),
                    bubbles: page.bubbles.clone(),
                })
            })
            .collect();

        PageContext {
            page_number: page_index,
            total_pages: MAX_STORY_PAGES,
            is_decision_page: is_decision_page(page_index),
            genre: self.settings.genre.clone(),
            tone: self.settings.tone.clone(),
            language: self.settings.language_name().to_string(),
            premise: self.settings.premise.clone(),
            rich_mode: self.settings.rich_mode,
            personas: self.personas.clone(),
            world: self.world.clone(),
            history,
        }
    }

    pub(crate) fn image_request(&self, scene: Option<String>, page_type: PageType) -> ImageRequest {
        ImageRequest {
            scene,
            page_type,
            art_style: self.settings.art_style.clone(),
            genre: self.settings.genre.clone(),
            language: self.settings.language_name().to_string(),
            personas: self.personas.clone(),
            world: self.world.clone(),
        }
    }

    /// One line per narrated page on the path, for fan-letter generation.
    pub(crate) fn letters_summary(&self) -> String {
        self.path
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .filter_map(|page| {
                page.narrative.as_ref().map(|beat| match &page.resolved_choice {
                    Some(choice) => format!(
                        "Page {}: {} (Reader chose: {choice})",
                        page.page_index, beat.scene
                    ),
                    None => format!("Page {}: {}", page.page_index, beat.scene),
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn snapshot(&self) -> GameState {
        GameState {
            personas: self.personas.clone(),
            story_tree: self.graph.clone(),
            path: self.path.clone(),
            sheet_index: self.sheet_index,
            started: self.started,
            settings: self.settings.clone(),
            tts: self.tts.clone(),
            world: self.world.clone(),
            timestamp: unix_timestamp(),
        }
    }

    /// Rebuild session state from a snapshot. A path id missing from the
    /// tree truncates the path there rather than failing the load.
    pub(crate) fn restore(saved: GameState) -> Self {
        let mut path = Vec::new();
        for id in saved.path {
            if saved.story_tree.get(id).is_some() {
                path.push(id);
            } else {
                break;
            }
        }

        Self {
            graph: saved.story_tree,
            path,
            world: saved.world,
            personas: saved.personas,
            settings: saved.settings,
            tts: saved.tts,
            sheet_index: saved.sheet_index,
            started: saved.started,
        }
    }
}

/// Removes its page index from the in-flight set when dropped, so the
/// slot is released on every exit path, including errors.
struct InFlightGuard {
    set: Arc<StdMutex<HashSet<u32>>>,
    page_index: u32,
}

impl InFlightGuard {
    /// Claim a page index. None means a generation for that index is
    /// already running and the caller must back off.
    fn acquire(set: &Arc<StdMutex<HashSet<u32>>>, page_index: u32) -> Option<Self> {
        let claimed = set
            .lock()
            .expect("in-flight set lock poisoned")
            .insert(page_index);
        claimed.then(|| Self {
            set: Arc::clone(set),
            page_index,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.page_index);
        }
    }
}

/// The generation state machine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn StoryBackend>,
    state: Arc<Mutex<SessionState>>,
    generating: Arc<StdMutex<HashSet<u32>>>,
    retry: RetryPolicy,
    events: mpsc::UnboundedSender<SessionEvent>,
    autosave: AutosaveBridge,
    video_poll_interval: Duration,
    video_poll_limit: u32,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn StoryBackend>,
        state: Arc<Mutex<SessionState>>,
        autosave: AutosaveBridge,
        events: mpsc::UnboundedSender<SessionEvent>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            state,
            generating: Arc::new(StdMutex::new(HashSet::new())),
            retry,
            events,
            autosave,
            video_poll_interval: DEFAULT_VIDEO_POLL_INTERVAL,
            video_poll_limit: DEFAULT_VIDEO_POLL_LIMIT,
        }
    }

    /// Override the video polling cadence and bound.
    pub fn with_video_polling(mut self, interval: Duration, limit: u32) -> Self {
        self.video_poll_interval = interval;
        self.video_poll_limit = limit;
        self
    }

    /// Generate content for a page that is already in the graph in its
    /// loading state.
    ///
    /// Re-entrant calls for the same page index are idempotent no-ops: a
    /// double-click or a re-render triggering the same generation twice
    /// produces exactly one backend call sequence. Failure never escapes;
    /// the page is left non-loading and unpopulated for a manual retry.
    pub async fn generate_page(&self, page_id: PageId, page_index: u32, page_type: PageType) {
        let Some(_guard) = InFlightGuard::acquire(&self.generating, page_index) else {
            log::debug!("page {page_index} already generating, ignoring duplicate request");
            return;
        };

        let result = match page_type {
            PageType::Letters => self.generate_letters_page(page_id).await,
            PageType::Cover => self.generate_image_only_page(page_id, PageType::Cover).await,
            PageType::BackCover => {
                self.generate_image_only_page(page_id, PageType::BackCover)
                    .await
            }
            PageType::Story => self.generate_story_page(page_id, page_index).await,
        };

        if let Err(error) = result {
            self.report_failure(&format!("page {page_index} generation"), &error);
            self.update_page(page_id, |page| page.is_loading = false).await;
        }

        self.schedule_autosave().await;
    }

    /// Resolve the reader's choice on the page at `page_index` of the
    /// displayed path.
    ///
    /// On the last story page this ends the main story instead: the
    /// letters page and back cover are synthesized once per path and
    /// generated concurrently. Otherwise the choice is recorded, a child
    /// story page is created and generated, and the displayed path and
    /// cursor advance to it. Re-resolving an earlier page with a new
    /// choice starts a sibling branch; the old branch stays reachable
    /// through the graph.
    pub async fn resolve_choice(&self, page_index: u32, choice: &str) {
        let next_index = page_index + 1;
        if next_index > MAX_STORY_PAGES {
            self.finish_story().await;
            return;
        }

        let child_id = {
            let mut state = self.state.lock().await;
            let Some(current_id) = state.page_on_path(page_index) else {
                log::warn!("no page at index {page_index} on the current path");
                return;
            };

            if Self::is_duplicate_resolution(&state, current_id, choice) {
                return;
            }

            state.graph.update(current_id, |page| {
                page.resolved_choice = Some(choice.to_string());
            });

            let mut child = Page::child_of(
                PageId::new(),
                PageType::Story,
                next_index,
                current_id,
                Some(choice.to_string()),
            );
            child.is_decision_page = is_decision_page(next_index);
            let child_id = child.id;
            state.graph.insert(child);

            // The new branch replaces anything previously displayed past
            // the resolving page.
            let cut = state
                .path
                .iter()
                .position(|id| *id == current_id)
                .map(|p| p + 1)
                .unwrap_or(state.path.len());
            state.path.truncate(cut);
            state.path.push(child_id);
            child_id
        };

        self.generate_page(child_id, next_index, PageType::Story).await;

        {
            let mut state = self.state.lock().await;
            state.sheet_index = ((next_index + 1) / 2) as usize;
        }
        self.schedule_autosave().await;
    }

    /// Re-run only the image step from the page's existing beat (or the
    /// fixed back-cover scene). A stale derived video is dropped along
    /// with the image it was derived from.
    pub async fn regenerate_image(&self, page_id: PageId) {
        let request = {
            let mut state = self.state.lock().await;
            let Some(page) = state.graph.get(page_id) else {
                return;
            };
            let scene = match (page.page_type, &page.narrative) {
                (PageType::Letters, _) => return,
                (PageType::Cover, _) => None,
                (PageType::BackCover, _) => Some(BACK_COVER_SCENE.to_string()),
                (PageType::Story, Some(beat)) => Some(beat.scene.clone()),
                (PageType::Story, None) => return,
            };
            let page_type = page.page_type;
            state.graph.update(page_id, |page| page.is_loading = true);
            state.image_request(scene, page_type)
        };

        let backend = Arc::clone(&self.backend);
        match with_backoff(&self.retry, || backend.generate_image(&request)).await {
            Ok(image) => {
                self.update_page(page_id, move |page| {
                    page.image_url = Some(image);
                    page.video_url = None;
                    page.is_loading = false;
                })
                .await;
            }
            Err(error) => {
                self.report_failure("image regeneration", &error);
                self.update_page(page_id, |page| page.is_loading = false).await;
            }
        }
        self.schedule_autosave().await;
    }

    /// Rewrite the page's beat per a reader instruction, replacing the
    /// narrative and bubbles.
    pub async fn revise_beat(&self, page_id: PageId, instruction: &str) {
        let beat = {
            let mut state = self.state.lock().await;
            let Some(beat) = state
                .graph
                .get(page_id)
                .and_then(|page| page.narrative.clone())
            else {
                return;
            };
            state.graph.update(page_id, |page| page.is_loading = true);
            beat
        };

        let backend = Arc::clone(&self.backend);
        match with_backoff(&self.retry, || backend.revise_beat(&beat, instruction)).await {
            Ok(revised) => {
                self.update_page(page_id, move |page| {
                    page.bubbles = revised.bubbles.clone();
                    page.narrative = Some(revised);
                    page.is_loading = false;
                })
                .await;
            }
            Err(error) => {
                self.report_failure("beat revision", &error);
                self.update_page(page_id, |page| page.is_loading = false).await;
            }
        }
        self.schedule_autosave().await;
    }

    /// Edit the page's rendered image per a reader instruction.
    pub async fn remix_image(&self, page_id: PageId, instruction: &str) {
        let base64 = {
            let mut state = self.state.lock().await;
            let Some(base64) = state
                .graph
                .get(page_id)
                .and_then(|page| page.image_base64().map(str::to_string))
            else {
                return;
            };
            state.graph.update(page_id, |page| page.is_animating = true);
            base64
        };

        let backend = Arc::clone(&self.backend);
        match with_backoff(&self.retry, || backend.edit_image(&base64, instruction)).await {
            Ok(image) => {
                self.update_page(page_id, move |page| {
                    page.image_url = Some(image);
                    page.is_animating = false;
                })
                .await;
            }
            Err(error) => {
                self.report_failure("image remix", &error);
                self.update_page(page_id, |page| page.is_animating = false).await;
            }
        }
        self.schedule_autosave().await;
    }

    /// Animate the page's existing image into a short video clip.
    ///
    /// The backend contract is submit, poll until done, fetch. A not-done
    /// poll is a suspension, not a failure; only a terminal outcome (done
    /// without a result, poll cap reached, or a thrown error) fails the
    /// animation, and `is_animating` clears on every path.
    pub async fn animate_page(&self, page_id: PageId) {
        let (base64, scene_hint, is_cover) = {
            let mut state = self.state.lock().await;
            let Some(page) = state.graph.get(page_id) else {
                return;
            };
            let Some(base64) = page.image_base64().map(str::to_string) else {
                return;
            };
            let scene_hint = page
                .narrative
                .as_ref()
                .map(|beat| beat.scene.clone())
                .unwrap_or_default();
            let is_cover = page.page_type == PageType::Cover;
            state.graph.update(page_id, |page| page.is_animating = true);
            (base64, scene_hint, is_cover)
        };

        match self.run_animation(&base64, &scene_hint, is_cover).await {
            Ok(uri) => {
                self.update_page(page_id, move |page| {
                    page.video_url = Some(uri);
                    page.is_animating = false;
                })
                .await;
            }
            Err(error) => {
                self.report_failure("animation", &error);
                self.update_page(page_id, |page| page.is_animating = false).await;
            }
        }
        self.schedule_autosave().await;
    }

    /// Schedule a debounced snapshot of the current state.
    pub(crate) async fn schedule_autosave(&self) {
        if !self.state.lock().await.started {
            return;
        }
        let state = Arc::clone(&self.state);
        self.autosave
            .schedule(move || async move { state.lock().await.snapshot() })
            .await;
    }

    // ========================================================================
    // Per-type pipelines
    // ========================================================================

    async fn generate_story_page(
        &self,
        page_id: PageId,
        page_index: u32,
    ) -> Result<(), BackendError> {
        let context = {
            let state = self.state.lock().await;
            state.beat_context(page_id, page_index)
        };

        let backend = Arc::clone(&self.backend);
        let beat = with_backoff(&self.retry, || backend.generate_beat(&context)).await?;

        // The beat's world delta lands before the image request is built,
        // so newly acquired items can show up in the art.
        let image_request = {
            let mut state = self.state.lock().await;
            state.world.apply(&beat.world_update);
            state.image_request(Some(beat.scene.clone()), PageType::Story)
        };
        let image = with_backoff(&self.retry, || backend.generate_image(&image_request)).await?;

        let tts = {
            let mut state = self.state.lock().await;
            let merged = beat.clone();
            state.graph.update(page_id, move |page| {
                page.bubbles = merged.bubbles.clone();
                page.choices = merged.choices.clone();
                page.narrative = Some(merged);
                page.image_url = Some(image);
                page.is_loading = false;
            });
            state.tts.clone()
        };

        self.spawn_narration(page_id, &beat, &tts);
        Ok(())
    }

    async fn generate_image_only_page(
        &self,
        page_id: PageId,
        page_type: PageType,
    ) -> Result<(), BackendError> {
        let scene = match page_type {
            PageType::BackCover => Some(BACK_COVER_SCENE.to_string()),
            _ => None,
        };
        let request = {
            let state = self.state.lock().await;
            state.image_request(scene, page_type)
        };

        let backend = Arc::clone(&self.backend);
        let image = with_backoff(&self.retry, || backend.generate_image(&request)).await?;
        self.update_page(page_id, move |page| {
            page.image_url = Some(image);
            page.is_loading = false;
        })
        .await;
        Ok(())
    }

    async fn generate_letters_page(&self, page_id: PageId) -> Result<(), BackendError> {
        let (summary, language) = {
            let state = self.state.lock().await;
            (
                state.letters_summary(),
                state.settings.language_name().to_string(),
            )
        };

        let backend = Arc::clone(&self.backend);
        let letters =
            with_backoff(&self.retry, || backend.generate_letters(&summary, &language)).await?;
        self.update_page(page_id, move |page| {
            page.letters_content = letters;
            page.is_loading = false;
        })
        .await;
        Ok(())
    }

    /// Synthesize and generate the letters page and back cover, once per
    /// path. Their generation order relative to each other is not
    /// significant, so both proceed concurrently.
    async fn finish_story(&self) {
        let (letters_id, back_id) = {
            let mut state = self.state.lock().await;
            let already_finished = state.path.iter().any(|id| {
                state
                    .graph
                    .get(*id)
                    .is_some_and(|page| page.page_index == LETTERS_PAGE)
            });
            if already_finished {
                return;
            }
            let Some(last_id) = state.path.last().copied() else {
                return;
            };

            let letters = Page::child_of(PageId::new(), PageType::Letters, LETTERS_PAGE, last_id, None);
            let back = Page::child_of(
                PageId::new(),
                PageType::BackCover,
                BACK_COVER_PAGE,
                letters.id,
                None,
            );
            let ids = (letters.id, back.id);
            state.graph.insert(letters);
            state.graph.insert(back);
            state.path.push(ids.0);
            state.path.push(ids.1);
            ids
        };

        futures::join!(
            self.generate_page(letters_id, LETTERS_PAGE, PageType::Letters),
            self.generate_page(back_id, BACK_COVER_PAGE, PageType::BackCover),
        );
    }

    async fn run_animation(
        &self,
        base64: &str,
        scene_hint: &str,
        is_cover: bool,
    ) -> Result<String, BackendError> {
        let backend = Arc::clone(&self.backend);
        let handle = with_backoff(&self.retry, || {
            backend.start_video(base64, scene_hint, is_cover)
        })
        .await?;

        let mut polls = 0;
        let status = loop {
            let status = with_backoff(&self.retry, || backend.poll_video(&handle)).await?;
            if status.done {
                break status;
            }
            polls += 1;
            if polls >= self.video_poll_limit {
                return Err(BackendError::Failed(format!(
                    "video not ready after {polls} polls"
                )));
            }
            tokio::time::sleep(self.video_poll_interval).await;
        };

        status
            .video_uri
            .ok_or_else(|| BackendError::Failed("video finished without a result".to_string()))
    }

    /// Detached read-aloud of a completed page's bubbles. Its failure is
    /// caught independently and never affects the page's completion.
    fn spawn_narration(&self, page_id: PageId, beat: &Beat, tts: &TtsSettings) {
        if !tts.auto_play || beat.bubbles.is_empty() {
            return;
        }

        let text = beat
            .bubbles
            .iter()
            .map(|bubble| bubble.text.clone())
            .collect::<Vec<_>>()
            .join(". ");
        let voice = match beat.focus_char.voice() {
            Some(voice) => voice.to_string(),
            None => tts.default_voice.clone(),
        };

        let backend = Arc::clone(&self.backend);
        let retry = self.retry;
        let events = self.events.clone();
        tokio::spawn(async move {
            match with_backoff(&retry, || backend.generate_speech(&text, &voice)).await {
                Ok(audio) => {
                    let _ = events.send(SessionEvent::NarrationReady { page_id, audio });
                }
                Err(error) => log::warn!("auto narration failed: {error}"),
            }
        });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn is_duplicate_resolution(state: &SessionState, current_id: PageId, choice: &str) -> bool {
        let same_choice = state
            .graph
            .get(current_id)
            .and_then(|page| page.resolved_choice.as_deref())
            == Some(choice);
        if !same_choice {
            return false;
        }
        let Some(position) = state.path.iter().position(|id| *id == current_id) else {
            return false;
        };
        state
            .path
            .get(position + 1)
            .and_then(|id| state.graph.get(*id))
            .is_some_and(|child| child.choice_label.as_deref() == Some(choice))
    }

    fn report_failure(&self, what: &str, error: &BackendError) {
        if error.is_access_denied() {
            log::warn!("{what} hit a credential failure, requesting re-auth");
            let _ = self.events.send(SessionEvent::ReauthRequired);
        } else {
            log::warn!("{what} failed: {error}");
        }
    }

    async fn update_page(&self, page_id: PageId, f: impl FnOnce(&mut Page)) {
        let mut state = self.state.lock().await;
        state.graph.update(page_id, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BubbleKind;

    fn state_with_story() -> SessionState {
        let mut state = SessionState::new(SessionSettings::default(), TtsSettings::default());

        let cover = Page::new(PageId::new(), PageType::Cover, 0);
        let mut first = Page::child_of(PageId::new(), PageType::Story, 1, cover.id, None);
        first.narrative = Some(Beat {
            scene: "A lighthouse in a storm.".to_string(),
            focus_char: crate::beat::FocusChar::Hero,
            bubbles: vec![crate::graph::Bubble {
                id: "1".to_string(),
                text: "We're close.".to_string(),
                kind: BubbleKind::Speech,
                character: Some("Aria".to_string()),
                x: 50.0,
                y: 10.0,
            }],
            choices: Vec::new(),
            world_update: Default::default(),
        });
        first.resolved_choice = Some("Climb the stairs".to_string());
        first.bubbles = first.narrative.as_ref().map(|b| b.bubbles.clone()).unwrap_or_default();

        let second = Page::child_of(
            PageId::new(),
            PageType::Story,
            2,
            first.id,
            Some("Climb the stairs".to_string()),
        );

        state.path = vec![cover.id, first.id, second.id];
        state.graph.insert(cover);
        state.graph.insert(first);
        state.graph.insert(second);
        state.started = true;
        state
    }

    #[test]
    fn test_in_flight_guard_blocks_and_releases() {
        let set = Arc::new(StdMutex::new(HashSet::new()));

        let guard = InFlightGuard::acquire(&set, 4);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&set, 4).is_none());
        // A different index is unaffected.
        assert!(InFlightGuard::acquire(&set, 5).is_some());

        drop(guard);
        assert!(InFlightGuard::acquire(&set, 4).is_some());
    }

    #[test]
    fn test_beat_context_history() {
        let state = state_with_story();
        let last_id = *state.path.last().unwrap();

        let context = state.beat_context(last_id, 2);

        // Only the narrated ancestor contributes history; the cover and
        // the pending page itself do not.
        assert_eq!(context.history.len(), 1);
        let entry = &context.history[0];
        assert_eq!(entry.page_index, 1);
        assert_eq!(entry.scene, "A lighthouse in a storm.");
        assert_eq!(entry.resolved_choice.as_deref(), Some("Climb the stairs"));
        assert_eq!(entry.bubbles.len(), 1);
        assert!(!context.is_decision_page);
    }

    #[test]
    fn test_letters_summary_includes_choices() {
        let state = state_with_story();
        let summary = state.letters_summary();
        assert_eq!(
            summary,
            "Page 1: A lighthouse in a storm. (Reader chose: Climb the stairs)"
        );
    }

    #[test]
    fn test_page_on_path_ignores_other_branches() {
        let mut state = state_with_story();
        let first_id = state.path[1];

        // A sibling branch at index 2 that is NOT on the displayed path.
        let sibling = Page::child_of(
            PageId::new(),
            PageType::Story,
            2,
            first_id,
            Some("Turn back".to_string()),
        );
        let sibling_id = sibling.id;
        state.graph.insert(sibling);

        let found = state.page_on_path(2).unwrap();
        assert_ne!(found, sibling_id);
        assert_eq!(found, state.path[2]);
    }

    #[test]
    fn test_restore_truncates_dangling_path() {
        let state = state_with_story();
        let mut snapshot = state.snapshot();
        // Simulate a snapshot whose path references a page the tree lost.
        snapshot.path.insert(2, PageId::new());

        let restored = SessionState::restore(snapshot);
        assert_eq!(restored.path.len(), 2);
        assert_eq!(restored.path, state.path[..2].to_vec());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let state = state_with_story();
        let snapshot = state.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let reloaded: GameState = serde_json::from_str(&json).unwrap();
        let restored = SessionState::restore(reloaded);

        assert_eq!(restored.path, state.path);
        assert_eq!(restored.graph.len(), state.graph.len());
        assert!(restored.started);
    }
}
