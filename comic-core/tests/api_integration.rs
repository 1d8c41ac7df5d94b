//! Integration tests against the real Gemini API.
//!
//! These tests cost money and require network access, so they are ignored
//! by default.
//!
//! Run with: `GEMINI_API_KEY=$GEMINI_API_KEY cargo test -p comic-core api_integration -- --ignored --nocapture`

use comic_core::autosave::MemoryStore;
use comic_core::{ComicSession, PersonaSlot, SessionConfig};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_persona_and_launch_against_real_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let store = Arc::new(MemoryStore::new());
    let session = ComicSession::from_env(store, SessionConfig::default())
        .expect("session should build from env");

    let persona = session
        .create_persona(PersonaSlot::Hero, "A classic comic book hero")
        .await
        .expect("persona generation should succeed");
    assert!(!persona.base64.is_empty());

    session.launch().await.expect("launch should succeed");

    // Poll until the first two pages finish generating.
    for _ in 0..120 {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let path = session.current_path().await;
        if path.iter().all(|page| !page.is_loading) {
            break;
        }
    }

    let path = session.current_path().await;
    println!("Cover populated: {}", path[0].image_url.is_some());
    println!(
        "Page 1 scene: {:?}",
        path[1].narrative.as_ref().map(|beat| &beat.scene)
    );
    assert!(path[1].narrative.is_some(), "first page should carry a beat");
}
