//! The generative backend contract.
//!
//! The core treats the backend as an opaque service: every operation is
//! fallible, stateless, and carries all the context it needs in the
//! request. [`BackendError`] classifies failures so the orchestrator can
//! pick a recovery: retry with backoff, surface a re-auth prompt, or log
//! and move on.

use crate::beat::{Beat, DecodeError};
use crate::graph::{Bubble, LetterItem, PageType};
use crate::persona::{CharacterBios, Persona, PersonaRegistry};
use crate::world::WorldState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from backend operations, pre-classified for recovery.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transient service overload; safe to retry with backoff.
    #[error("backend overloaded: {0}")]
    Overloaded(String),

    /// Missing or rejected credentials; never retried, the caller must
    /// re-authenticate.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The backend answered but not in the expected shape.
    #[error("malformed backend output: {0}")]
    Malformed(String),

    /// Anything else: network trouble, unexpected API errors.
    #[error("backend request failed: {0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_overloaded(&self) -> bool {
        matches!(self, BackendError::Overloaded(_))
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, BackendError::AccessDenied(_))
    }
}

impl From<gemini::Error> for BackendError {
    fn from(error: gemini::Error) -> Self {
        if error.is_overloaded() {
            BackendError::Overloaded(error.to_string())
        } else if error.is_access_denied() {
            BackendError::AccessDenied(error.to_string())
        } else if matches!(error, gemini::Error::Parse(_)) {
            BackendError::Malformed(error.to_string())
        } else {
            BackendError::Failed(error.to_string())
        }
    }
}

impl From<DecodeError> for BackendError {
    fn from(error: DecodeError) -> Self {
        BackendError::Malformed(error.to_string())
    }
}

/// One ancestor page in the history handed to beat generation, ordered
/// oldest to newest so the backend can hold dialogue continuity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub page_index: u32,
    pub scene: String,
    pub resolved_choice: Option<String>,
    pub bubbles: Vec<Bubble>,
}

/// Everything a beat request needs to know.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub page_number: u32,
    pub total_pages: u32,
    pub is_decision_page: bool,
    pub genre: String,
    pub tone: String,
    pub language: String,
    pub premise: String,
    pub rich_mode: bool,
    pub personas: PersonaRegistry,
    pub world: WorldState,
    pub history: Vec<HistoryEntry>,
}

/// Everything an image render needs to know.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Beat scene to render; None for covers, which use a fixed
    /// composition prompt instead.
    pub scene: Option<String>,
    pub page_type: PageType,
    pub art_style: String,
    pub genre: String,
    pub language: String,
    pub personas: PersonaRegistry,
    pub world: WorldState,
}

/// Inputs to the batch bios call.
#[derive(Debug, Clone)]
pub struct BiosRequest {
    pub genre: String,
    pub tone: String,
    pub language: String,
    pub has_friend: bool,
    pub has_villain: bool,
}

/// Inputs to an in-character chat reply.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub persona: Persona,
    pub role: String,
    pub message: String,
    pub scene: String,
    pub genre: String,
    pub language: String,
}

/// Opaque handle to a long-running video generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoHandle {
    pub operation: String,
}

/// Result of polling a video generation.
#[derive(Debug, Clone)]
pub struct VideoStatus {
    pub done: bool,
    pub video_uri: Option<String>,
}

/// The operations the orchestrator consumes.
///
/// Implementations are stateless per call; the mock in [`crate::testing`]
/// scripts responses for deterministic tests.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    /// Generate the narrative beat for one story page.
    async fn generate_beat(&self, context: &PageContext) -> Result<Beat, BackendError>;

    /// Rewrite an existing beat per a reader instruction, keeping the
    /// same shape and a text-free scene.
    async fn revise_beat(&self, beat: &Beat, instruction: &str) -> Result<Beat, BackendError>;

    /// Render panel art; returns a data URL.
    async fn generate_image(&self, request: &ImageRequest) -> Result<String, BackendError>;

    /// Edit existing art per a reader instruction; returns a data URL.
    async fn edit_image(&self, base64: &str, instruction: &str) -> Result<String, BackendError>;

    /// Start an asynchronous video generation from existing art.
    async fn start_video(
        &self,
        base64: &str,
        scene_hint: &str,
        is_cover: bool,
    ) -> Result<VideoHandle, BackendError>;

    /// Poll a video generation; not-done is a suspension, not a failure.
    async fn poll_video(&self, handle: &VideoHandle) -> Result<VideoStatus, BackendError>;

    /// Synthesize speech; returns base64 audio.
    async fn generate_speech(&self, text: &str, voice: &str) -> Result<String, BackendError>;

    /// Generate fan letters from a story summary.
    async fn generate_letters(
        &self,
        summary: &str,
        language: &str,
    ) -> Result<Vec<LetterItem>, BackendError>;

    /// Generate names and backstories for the populated persona slots.
    async fn generate_bios(&self, request: &BiosRequest) -> Result<CharacterBios, BackendError>;

    /// Generate a persona portrait from a description.
    async fn generate_persona(
        &self,
        desc: &str,
        art_style: &str,
        genre: &str,
    ) -> Result<Persona, BackendError>;

    /// Generate an in-character reply to the reader.
    async fn character_reply(&self, request: &ChatRequest) -> Result<String, BackendError>;
}
