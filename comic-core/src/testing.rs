//! Testing utilities for the comic engine.
//!
//! This module provides tools for integration testing:
//! - `MockBackend` for deterministic testing without API calls
//! - `TestHarness` wiring a session to the mock and an in-memory store
//! - Assertion helpers for verifying page state

use crate::autosave::MemoryStore;
use crate::backend::{
    BackendError, BiosRequest, ChatRequest, ImageRequest, PageContext, StoryBackend, VideoHandle,
    VideoStatus,
};
use crate::beat::{Beat, FocusChar};
use crate::graph::{Bubble, BubbleKind, LetterItem, Page, Sentiment};
use crate::persona::{BioEntry, CharacterBios, Persona};
use crate::session::{ComicSession, SessionConfig};
use crate::world::WorldUpdate;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-operation call counters, for asserting how often the backend was
/// actually hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallCounts {
    pub beats: usize,
    pub revisions: usize,
    pub images: usize,
    pub edits: usize,
    pub video_starts: usize,
    pub video_polls: usize,
    pub speeches: usize,
    pub letters: usize,
    pub bios: usize,
    pub personas: usize,
    pub replies: usize,
}

#[derive(Default)]
struct MockState {
    beats: VecDeque<Beat>,
    images: VecDeque<String>,
    letters: VecDeque<Vec<LetterItem>>,
    bios: VecDeque<CharacterBios>,
    replies: VecDeque<String>,
    failure: Option<BackendError>,
    delay: Option<Duration>,
    video_polls_until_done: u32,
    beat_contexts: Vec<PageContext>,
    image_requests: Vec<ImageRequest>,
    counts: CallCounts,
}

/// A mock backend with scripted responses.
///
/// Responses are queued per operation; an empty queue falls back to a
/// sensible default so tests only script what they assert on. Failure
/// injection applies to every operation until cleared.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain story beat with one line of dialogue.
    pub fn sample_beat(scene: impl Into<String>) -> Beat {
        Beat {
            scene: scene.into(),
            focus_char: FocusChar::Hero,
            bubbles: vec![Bubble {
                id: "1".to_string(),
                text: "Onward.".to_string(),
                kind: BubbleKind::Speech,
                character: Some("Hero".to_string()),
                x: 50.0,
                y: 12.0,
            }],
            choices: Vec::new(),
            world_update: WorldUpdate::default(),
        }
    }

    /// Queue the next beat response.
    pub fn queue_beat(&self, beat: Beat) -> &Self {
        self.lock().beats.push_back(beat);
        self
    }

    /// Queue the next image response.
    pub fn queue_image(&self, data_url: impl Into<String>) -> &Self {
        self.lock().images.push_back(data_url.into());
        self
    }

    /// Queue the next letters response.
    pub fn queue_letters(&self, letters: Vec<LetterItem>) -> &Self {
        self.lock().letters.push_back(letters);
        self
    }

    /// Queue the next bios response.
    pub fn queue_bios(&self, bios: CharacterBios) -> &Self {
        self.lock().bios.push_back(bios);
        self
    }

    /// Queue the next chat reply.
    pub fn queue_reply(&self, reply: impl Into<String>) -> &Self {
        self.lock().replies.push_back(reply.into());
        self
    }

    /// Fail every operation with a clone of this error until cleared.
    pub fn set_failure(&self, error: BackendError) {
        self.lock().failure = Some(error);
    }

    /// Stop failing.
    pub fn clear_failure(&self) {
        self.lock().failure = None;
    }

    /// Delay beat and image generation, so tests can observe the loading
    /// state and exercise the in-flight guard.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Require this many not-done polls before the mock video finishes.
    pub fn set_video_polls_until_done(&self, polls: u32) {
        self.lock().video_polls_until_done = polls;
    }

    /// Snapshot of the call counters.
    pub fn counts(&self) -> CallCounts {
        self.lock().counts
    }

    /// Every context handed to `generate_beat`, in call order.
    pub fn beat_contexts(&self) -> Vec<PageContext> {
        self.lock().beat_contexts.clone()
    }

    /// Every request handed to `generate_image`, in call order.
    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.lock().image_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().expect("mock backend lock poisoned")
    }

    fn check_failure(&self) -> Result<(), BackendError> {
        match &self.lock().failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn maybe_delay(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn default_beat(is_decision_page: bool) -> Beat {
        let mut beat = Self::sample_beat("The story continues.");
        if is_decision_page {
            beat.choices = vec![
                "Stand and fight".to_string(),
                "Slip into the shadows".to_string(),
            ];
        }
        beat
    }
}

#[async_trait]
impl StoryBackend for MockBackend {
    async fn generate_beat(&self, context: &PageContext) -> Result<Beat, BackendError> {
        {
            let mut state = self.lock();
            state.counts.beats += 1;
            state.beat_contexts.push(context.clone());
        }
        self.maybe_delay().await;
        self.check_failure()?;
        let queued = self.lock().beats.pop_front();
        Ok(queued.unwrap_or_else(|| Self::default_beat(context.is_decision_page)))
    }

    async fn revise_beat(&self, beat: &Beat, instruction: &str) -> Result<Beat, BackendError> {
        self.lock().counts.revisions += 1;
        self.check_failure()?;
        let queued = self.lock().beats.pop_front();
        Ok(queued.unwrap_or_else(|| {
            let mut revised = beat.clone();
            revised.scene = format!("{} (revised: {instruction})", beat.scene);
            revised
        }))
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, BackendError> {
        {
            let mut state = self.lock();
            state.counts.images += 1;
            state.image_requests.push(request.clone());
        }
        self.maybe_delay().await;
        self.check_failure()?;
        let queued = self.lock().images.pop_front();
        Ok(queued.unwrap_or_else(|| "data:image/jpeg;base64,bW9jaw==".to_string()))
    }

    async fn edit_image(&self, _base64: &str, _instruction: &str) -> Result<String, BackendError> {
        self.lock().counts.edits += 1;
        self.check_failure()?;
        Ok("data:image/jpeg;base64,ZWRpdGVk".to_string())
    }

    async fn start_video(
        &self,
        _base64: &str,
        _scene_hint: &str,
        _is_cover: bool,
    ) -> Result<VideoHandle, BackendError> {
        self.lock().counts.video_starts += 1;
        self.check_failure()?;
        Ok(VideoHandle {
            operation: "operations/mock-video".to_string(),
        })
    }

    async fn poll_video(&self, _handle: &VideoHandle) -> Result<VideoStatus, BackendError> {
        self.check_failure()?;
        let mut state = self.lock();
        state.counts.video_polls += 1;
        if state.video_polls_until_done > 0 {
            state.video_polls_until_done -= 1;
            Ok(VideoStatus {
                done: false,
                video_uri: None,
            })
        } else {
            Ok(VideoStatus {
                done: true,
                video_uri: Some("https://example.com/mock.mp4".to_string()),
            })
        }
    }

    async fn generate_speech(&self, _text: &str, _voice: &str) -> Result<String, BackendError> {
        self.lock().counts.speeches += 1;
        self.check_failure()?;
        Ok("bW9jay1hdWRpbw==".to_string())
    }

    async fn generate_letters(
        &self,
        _summary: &str,
        _language: &str,
    ) -> Result<Vec<LetterItem>, BackendError> {
        self.lock().counts.letters += 1;
        self.check_failure()?;
        let queued = self.lock().letters.pop_front();
        Ok(queued.unwrap_or_else(|| {
            vec![LetterItem {
                user: "Mock Fan".to_string(),
                location: "Testville".to_string(),
                text: "Best issue yet!".to_string(),
                sentiment: Sentiment::Positive,
            }]
        }))
    }

    async fn generate_bios(&self, _request: &BiosRequest) -> Result<CharacterBios, BackendError> {
        self.lock().counts.bios += 1;
        self.check_failure()?;
        let queued = self.lock().bios.pop_front();
        Ok(queued.unwrap_or_else(|| CharacterBios {
            hero: Some(BioEntry {
                name: "Mock Hero".to_string(),
                backstory: "Forged in the test fires.".to_string(),
            }),
            friend: None,
            villain: None,
        }))
    }

    async fn generate_persona(
        &self,
        desc: &str,
        _art_style: &str,
        _genre: &str,
    ) -> Result<Persona, BackendError> {
        self.lock().counts.personas += 1;
        self.check_failure()?;
        Ok(Persona::new("bW9jay1wb3J0cmFpdA==", desc))
    }

    async fn character_reply(&self, _request: &ChatRequest) -> Result<String, BackendError> {
        self.lock().counts.replies += 1;
        self.check_failure()?;
        let queued = self.lock().replies.pop_front();
        Ok(queued.unwrap_or_else(|| "You dare address me?".to_string()))
    }
}

/// Test harness wiring a session to a mock backend and an in-memory
/// store, with fast timers suitable for paused-clock tests.
pub struct TestHarness {
    pub backend: MockBackend,
    pub store: MemoryStore,
    pub session: ComicSession,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(
            SessionConfig::default()
                .with_autosave_delay(Duration::from_millis(100))
                .with_video_polling(Duration::from_millis(100), 5),
        )
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let session = ComicSession::new(
            Arc::new(backend.clone()),
            Arc::new(store.clone()),
            config,
        );

        Self {
            backend,
            store,
            session,
        }
    }

    /// A portrait-bearing hero persona for setup.
    pub fn sample_hero() -> Persona {
        Persona::new("aGVyby1wb3J0cmFpdA==", "A masked knight")
    }

    /// Install the sample hero.
    pub async fn add_hero(&self) {
        self.session
            .set_persona(crate::persona::PersonaSlot::Hero, Some(Self::sample_hero()))
            .await;
    }

    /// Wait until no page on any branch is loading or animating.
    pub async fn settle(&self) {
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let busy = self
                .session
                .story_tree()
                .await
                .iter()
                .any(|page| page.is_loading || page.is_animating);
            if !busy {
                return;
            }
        }
        panic!("pages never settled");
    }

    /// The page at `page_index` on the displayed path.
    pub async fn page_at(&self, page_index: u32) -> Option<Page> {
        self.session
            .current_path()
            .await
            .into_iter()
            .find(|page| page.page_index == page_index)
    }

    /// Walk the displayed path from the given index, resolving scripted
    /// choices until `until_index` is the path's last story page.
    pub async fn advance_to(&self, until_index: u32) {
        let mut index = self
            .session
            .current_path()
            .await
            .last()
            .map(|page| page.page_index)
            .unwrap_or(0);
        while index < until_index {
            self.session.resolve_choice(index, "Press on").await;
            index += 1;
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a page finished generating with content.
#[track_caller]
pub fn assert_populated(page: &Page) {
    assert!(
        !page.is_loading,
        "expected page {} (index {}) to be done loading",
        page.id, page.page_index
    );
    assert!(
        page.narrative.is_some() || page.image_url.is_some() || !page.letters_content.is_empty(),
        "expected page {} (index {}) to have content",
        page.id,
        page.page_index
    );
}

/// Assert a page is still loading and empty.
#[track_caller]
pub fn assert_loading(page: &Page) {
    assert!(
        page.is_loading,
        "expected page {} (index {}) to be loading",
        page.id, page.page_index
    );
    assert!(
        page.narrative.is_none() && page.image_url.is_none(),
        "expected page {} (index {}) to be empty while loading",
        page.id,
        page.page_index
    );
}

/// Assert `child` was produced from `parent` along one path.
#[track_caller]
pub fn assert_story_link(parent: &Page, child: &Page) {
    assert_eq!(
        child.parent_id,
        Some(parent.id),
        "expected page {} to be a child of {}",
        child.page_index,
        parent.page_index
    );
    assert_eq!(
        child.page_index,
        parent.page_index + 1,
        "expected child index to follow parent"
    );
}

/// Assert the displayed path carries exactly these page indices in order.
#[track_caller]
pub fn assert_path_indices(pages: &[Page], expected: &[u32]) {
    let actual: Vec<u32> = pages.iter().map(|page| page.page_index).collect();
    assert_eq!(actual, expected, "displayed path indices mismatch");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PageContext;
    use crate::persona::PersonaRegistry;
    use crate::settings::MAX_STORY_PAGES;
    use crate::world::WorldState;

    fn context(is_decision_page: bool) -> PageContext {
        PageContext {
            page_number: 2,
            total_pages: MAX_STORY_PAGES,
            is_decision_page,
            genre: "High Fantasy".to_string(),
            tone: "OPERATIC".to_string(),
            language: "English (US)".to_string(),
            premise: String::new(),
            rich_mode: true,
            personas: PersonaRegistry::new(),
            world: WorldState::default(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_queues_then_defaults() {
        let backend = MockBackend::new();
        backend.queue_beat(MockBackend::sample_beat("A scripted scene."));

        let first = backend.generate_beat(&context(false)).await.unwrap();
        assert_eq!(first.scene, "A scripted scene.");

        let second = backend.generate_beat(&context(false)).await.unwrap();
        assert_eq!(second.scene, "The story continues.");
        assert_eq!(backend.counts().beats, 2);
    }

    #[tokio::test]
    async fn test_mock_default_decision_beat_has_choices() {
        let backend = MockBackend::new();
        let beat = backend.generate_beat(&context(true)).await.unwrap();
        assert_eq!(beat.choices.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let backend = MockBackend::new();
        backend.set_failure(BackendError::Overloaded("busy".to_string()));

        assert!(backend.generate_beat(&context(false)).await.is_err());
        assert!(backend
            .generate_image(&ImageRequest {
                scene: None,
                page_type: crate::graph::PageType::Cover,
                art_style: String::new(),
                genre: String::new(),
                language: String::new(),
                personas: PersonaRegistry::new(),
                world: WorldState::default(),
            })
            .await
            .is_err());

        backend.clear_failure();
        assert!(backend.generate_beat(&context(false)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_video_poll_countdown() {
        let backend = MockBackend::new();
        backend.set_video_polls_until_done(2);
        let handle = backend.start_video("img", "scene", false).await.unwrap();

        assert!(!backend.poll_video(&handle).await.unwrap().done);
        assert!(!backend.poll_video(&handle).await.unwrap().done);
        let last = backend.poll_video(&handle).await.unwrap();
        assert!(last.done);
        assert!(last.video_uri.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_harness_launch_settles() {
        let harness = TestHarness::new();
        harness.add_hero().await;
        harness.session.launch().await.unwrap();
        harness.settle().await;

        let path = harness.session.current_path().await;
        assert_eq!(path.len(), 2);
        assert_populated(&path[0]);
        assert_populated(&path[1]);
    }
}
