//! QA tests for autosave and session restore using the mock backend.

use comic_core::autosave::{MemoryStore, SaveStore};
use comic_core::testing::{assert_path_indices, MockBackend, TestHarness};
use comic_core::{ComicSession, PersonaSlot, SessionConfig};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_autosave_delay(Duration::from_millis(100))
        .with_video_polling(Duration::from_millis(100), 5)
}

#[tokio::test(start_paused = true)]
async fn test_no_save_initially() {
    let harness = TestHarness::new();
    assert!(!harness.session.has_save().await.unwrap());
    assert!(harness.store.load().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_autosave_snapshots_after_generation() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;

    // Let the debounce window elapse.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(harness.store.save_count() >= 1);
    let saved = harness.store.load().await.unwrap().unwrap();
    assert!(saved.started);
    assert_eq!(saved.path.len(), 2);
    assert!(saved.personas.hero.is_some());
    assert_eq!(saved.story_tree.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_mutations_coalesce_into_one_write() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let writes_after_launch = harness.store.save_count();

    // Bubble drags land in quick succession; one write covers them all.
    let first = harness.page_at(1).await.unwrap();
    for _ in 0..5 {
        harness
            .session
            .update_bubbles(first.id, first.bubbles.clone())
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.store.save_count(), writes_after_launch + 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_restores_session() {
    let backend = MockBackend::new();
    let store = MemoryStore::new();

    // First session: play a couple of pages, then save.
    {
        let session = ComicSession::new(
            Arc::new(backend.clone()),
            Arc::new(store.clone()),
            fast_config(),
        );
        session
            .set_persona(PersonaSlot::Hero, Some(TestHarness::sample_hero()))
            .await;
        session.launch().await.unwrap();

        // Wait out the initial generations.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if session
                .current_path()
                .await
                .iter()
                .all(|page| !page.is_loading)
            {
                break;
            }
        }
        session.resolve_choice(1, "Head north").await;
        session.save_now().await.unwrap();
    }

    // Second session over the same store resumes where the first left
    // off.
    let session = ComicSession::new(Arc::new(backend), Arc::new(store.clone()), fast_config());
    assert!(session.has_save().await.unwrap());
    assert!(session.resume().await.unwrap());

    assert!(session.is_started().await);
    let path = session.current_path().await;
    assert_path_indices(&path, &[0, 1, 2]);
    assert_eq!(path[2].choice_label.as_deref(), Some("Head north"));
    assert!(session.personas().await.hero.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_save_returns_false() {
    let harness = TestHarness::new();
    assert!(!harness.session.resume().await.unwrap());
    assert!(!harness.session.is_started().await);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_store_and_memory() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    harness.session.save_now().await.unwrap();
    assert!(harness.session.has_save().await.unwrap());

    harness.session.reset().await.unwrap();

    assert!(!harness.session.has_save().await.unwrap());
    assert!(harness.session.story_tree().await.is_empty());
    assert!(harness.session.current_path().await.is_empty());
    assert!(!harness.session.is_started().await);
    assert!(harness.session.personas().await.hero.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_settings_changes_trigger_autosave() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let writes_before = harness.store.save_count();

    let mut tts = harness.session.tts_settings().await;
    tts.playback_speed = 1.5;
    harness.session.set_tts_settings(tts).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.store.save_count(), writes_before + 1);
    let saved = harness.store.load().await.unwrap().unwrap();
    assert_eq!(saved.tts.playback_speed, 1.5);
}
