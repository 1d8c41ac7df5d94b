//! Branching generated-comic engine.
//!
//! This crate provides:
//! - A branching story graph with arbitrary jump navigation
//! - An AI generation orchestrator for narrative, art, audio, and video
//! - World-state and persona tracking for cross-page consistency
//! - Debounced autosave persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use comic_core::{ComicSession, SessionConfig, PersonaSlot};
//! use comic_core::autosave::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileStore::new("autosave.json"));
//!     let session = ComicSession::from_env(store, SessionConfig::default())?;
//!
//!     session.create_persona(PersonaSlot::Hero, "A classic comic book hero").await?;
//!     session.launch().await?;
//!     Ok(())
//! }
//! ```

pub mod autosave;
pub mod backend;
pub mod beat;
pub mod gemini_backend;
pub mod graph;
pub mod orchestrator;
pub mod persona;
pub mod retry;
pub mod session;
pub mod settings;
pub mod testing;
pub mod world;

// Primary public API
pub use backend::{BackendError, StoryBackend};
pub use beat::{Beat, FocusChar};
pub use gemini_backend::GeminiBackend;
pub use graph::{Bubble, BubbleKind, LetterItem, Page, PageId, PageType, StoryGraph};
pub use orchestrator::{Orchestrator, SessionEvent};
pub use persona::{Persona, PersonaRegistry, PersonaSlot};
pub use retry::RetryPolicy;
pub use session::{ComicSession, SessionConfig, SessionError};
pub use settings::{SessionSettings, TtsSettings};
pub use testing::{MockBackend, TestHarness};
pub use world::{WorldState, WorldUpdate};
