//! QA tests for the story flow using the mock backend.
//!
//! These tests verify the orchestration pipeline end to end:
//! - Launch produces a concurrent cover + first page
//! - Choice resolution, branching, and the story ending
//! - The per-index in-flight guard
//! - Failure recovery and the retry bound
//! - World-state accumulation across beats

use comic_core::backend::BackendError;
use comic_core::testing::{
    assert_loading, assert_path_indices, assert_populated, assert_story_link, MockBackend,
    TestHarness,
};
use comic_core::world::WorldUpdate;
use comic_core::{PageType, SessionEvent};
use std::time::Duration;

// =============================================================================
// LAUNCH
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_launch_creates_cover_and_first_page() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.backend.set_delay(Duration::from_millis(500));

    harness.session.launch().await.unwrap();

    // Both initial pages exist in their loading state while generation
    // is in flight.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let path = harness.session.current_path().await;
    assert_path_indices(&path, &[0, 1]);
    assert_eq!(path[0].page_type, PageType::Cover);
    assert!(path[0].parent_id.is_none());
    assert_eq!(path[1].page_type, PageType::Story);
    assert_story_link(&path[0], &path[1]);
    assert_loading(&path[0]);
    assert_loading(&path[1]);

    harness.settle().await;

    let path = harness.session.current_path().await;
    assert_populated(&path[0]);
    assert_populated(&path[1]);
    assert!(path[0].image_url.is_some());
    assert!(path[1].narrative.is_some());

    // Page 1 is not in the decision schedule.
    assert!(!path[1].is_decision_page);
    let contexts = harness.backend.beat_contexts();
    assert_eq!(contexts.len(), 1);
    assert!(!contexts[0].is_decision_page);
    assert!(contexts[0].history.is_empty());

    // One beat for the story page, one image each for cover and story.
    let counts = harness.backend.counts();
    assert_eq!(counts.beats, 1);
    assert_eq!(counts.images, 2);
}

#[tokio::test(start_paused = true)]
async fn test_launch_requires_hero() {
    let harness = TestHarness::new();
    assert!(harness.session.launch().await.is_err());
    assert!(!harness.session.is_started().await);
}

// =============================================================================
// IN-FLIGHT GUARD
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_generation_is_suppressed() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.backend.set_delay(Duration::from_millis(500));

    let (_, first_id) = harness.session.launch().await.unwrap();

    // A second request for the same page index while the first is in
    // flight must not reach the backend.
    harness
        .session
        .orchestrator()
        .generate_page(first_id, 1, PageType::Story)
        .await;
    harness.settle().await;

    let counts = harness.backend.counts();
    assert_eq!(counts.beats, 1);
    assert_eq!(counts.images, 2);
    assert_populated(&harness.page_at(1).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_guard_releases_after_failure() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.backend.set_failure(BackendError::Failed("boom".to_string()));

    let (_, first_id) = harness.session.launch().await.unwrap();
    harness.settle().await;

    // The failed page is not stuck loading and the slot is free again.
    let page = harness.page_at(1).await.unwrap();
    assert!(!page.is_loading);
    assert!(page.narrative.is_none());

    harness.backend.clear_failure();
    harness
        .session
        .orchestrator()
        .generate_page(first_id, 1, PageType::Story)
        .await;

    assert_populated(&harness.page_at(1).await.unwrap());
}

// =============================================================================
// CHOICE RESOLUTION
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_choice_on_decision_page() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    harness.advance_to(3).await;

    // Page 3 sits in the decision schedule, so its beat carries choices.
    let page_three = harness.page_at(3).await.unwrap();
    assert!(page_three.is_decision_page);
    assert_eq!(page_three.choices.len(), 2);

    harness.session.resolve_choice(3, "Fight").await;

    let page_three = harness.page_at(3).await.unwrap();
    assert_eq!(page_three.resolved_choice.as_deref(), Some("Fight"));

    let page_four = harness.page_at(4).await.unwrap();
    assert_eq!(page_four.parent_id, Some(page_three.id));
    assert_eq!(page_four.choice_label.as_deref(), Some("Fight"));
    assert_eq!(page_four.page_index, 4);
    assert!(!page_four.is_decision_page);
    assert_populated(&page_four);

    let path = harness.session.current_path().await;
    assert_path_indices(&path, &[0, 1, 2, 3, 4]);
    assert_eq!(harness.session.sheet_index().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_double_click_same_choice_is_idempotent() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    harness.advance_to(3).await;
    let page_three = harness.page_at(3).await.unwrap();

    harness.session.resolve_choice(3, "Fight").await;
    harness.session.resolve_choice(3, "Fight").await;

    // One child, not two.
    assert_eq!(harness.session.children_of(page_three.id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_choice_branches_and_keeps_old_branch() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    harness.advance_to(3).await;
    let page_three = harness.page_at(3).await.unwrap();

    harness.session.resolve_choice(3, "Fight").await;
    let fight_page = harness.page_at(4).await.unwrap();

    harness.session.resolve_choice(3, "Flee").await;
    let flee_page = harness.page_at(4).await.unwrap();

    // The displayed path follows the new branch; the old one is still in
    // the graph, reachable for time travel.
    assert_ne!(fight_page.id, flee_page.id);
    assert_eq!(flee_page.choice_label.as_deref(), Some("Flee"));
    assert_eq!(harness.session.children_of(page_three.id).await.len(), 2);
    assert!(harness.session.page(fight_page.id).await.is_some());

    // Jumping back to the abandoned branch reconstructs its path.
    harness.session.jump_to_node(fight_page.id).await.unwrap();
    let path = harness.session.current_path().await;
    assert_path_indices(&path, &[0, 1, 2, 3, 4]);
    assert_eq!(path.last().unwrap().id, fight_page.id);
}

// =============================================================================
// STORY ENDING
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_final_choice_synthesizes_ending_once() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    harness.advance_to(10).await;

    harness.session.resolve_choice(10, "Face destiny").await;
    harness.settle().await;

    let letters = harness.page_at(11).await.unwrap();
    assert_eq!(letters.page_type, PageType::Letters);
    assert!(!letters.letters_content.is_empty());
    assert!(!letters.is_loading);

    let back = harness.page_at(12).await.unwrap();
    assert_eq!(back.page_type, PageType::BackCover);
    assert!(back.image_url.is_some());

    // Repeated resolution never duplicates the ending pair.
    harness.session.resolve_choice(10, "Face destiny").await;
    harness.settle().await;

    let tree = harness.session.story_tree().await;
    assert_eq!(tree.iter().filter(|p| p.page_index == 11).count(), 1);
    assert_eq!(tree.iter().filter(|p| p.page_index == 12).count(), 1);
    let counts = harness.backend.counts();
    assert_eq!(counts.letters, 1);
}

// =============================================================================
// FAILURE HANDLING
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_overloaded_backend_retries_then_fails_clean() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness
        .backend
        .set_failure(BackendError::Overloaded("model overloaded".to_string()));

    harness.session.launch().await.unwrap();
    harness.settle().await;

    // Exactly the configured attempt count per operation: three beat
    // attempts for page 1, three image attempts for the cover.
    let counts = harness.backend.counts();
    assert_eq!(counts.beats, 3);
    assert_eq!(counts.images, 3);

    // Both pages end non-loading and unpopulated, ready for manual retry.
    for page in harness.session.current_path().await {
        assert!(!page.is_loading);
        assert!(page.narrative.is_none());
        assert!(page.image_url.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_access_denied_surfaces_reauth_event() {
    let mut harness = TestHarness::new();
    harness.add_hero().await;
    harness
        .backend
        .set_failure(BackendError::AccessDenied("API_KEY_INVALID".to_string()));

    harness.session.launch().await.unwrap();
    harness.settle().await;

    // No retry on credential failures.
    assert_eq!(harness.backend.counts().beats, 1);
    assert!(matches!(
        harness.session.try_next_event(),
        Some(SessionEvent::ReauthRequired)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stale_write_after_reset_is_discarded() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();

    harness.session.reset().await.unwrap();

    // A result arriving for a page the reset threw away does nothing.
    harness.session.update_bubbles(first.id, Vec::new()).await;
    assert!(harness.session.story_tree().await.is_empty());
    assert!(harness.session.page(first.id).await.is_none());
}

// =============================================================================
// WORLD STATE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_world_state_accumulates_across_beats() {
    let harness = TestHarness::new();
    harness.add_hero().await;

    let mut found = MockBackend::sample_beat("The hero finds a lantern in the wreck.");
    found.world_update = WorldUpdate {
        add_items: vec!["Lantern".to_string()],
        add_status: vec!["Injured".to_string()],
        ..WorldUpdate::default()
    };
    harness.backend.queue_beat(found);

    harness.session.launch().await.unwrap();
    harness.settle().await;

    let world = harness.session.world_state().await;
    assert_eq!(world.inventory, vec!["Lantern"]);
    assert_eq!(world.status, vec!["Injured"]);

    // The image request for page 1 already saw the updated world.
    let story_image = harness
        .backend
        .image_requests()
        .into_iter()
        .find(|request| request.page_type == PageType::Story)
        .unwrap();
    assert_eq!(story_image.world.inventory, vec!["Lantern"]);

    let mut healed = MockBackend::sample_beat("A quiet moment to bind wounds.");
    healed.world_update = WorldUpdate {
        remove_status: vec!["Injured".to_string()],
        ..WorldUpdate::default()
    };
    harness.backend.queue_beat(healed);
    harness.session.resolve_choice(1, "Rest a while").await;

    let world = harness.session.world_state().await;
    assert_eq!(world.inventory, vec!["Lantern"]);
    assert!(world.status.is_empty());
}

// =============================================================================
// PAGE REVISION OPERATIONS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_revise_beat_replaces_narrative() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();

    harness
        .session
        .revise_beat(first.id, "make it rain")
        .await;

    let revised = harness.page_at(1).await.unwrap();
    assert!(revised
        .narrative
        .unwrap()
        .scene
        .contains("revised: make it rain"));
    assert!(!revised.is_loading);
    assert_eq!(harness.backend.counts().revisions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_remix_replaces_image_only() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();
    let narrative_before = first.narrative.clone();

    harness.session.remix_image(first.id, "add a dragon").await;

    let remixed = harness.page_at(1).await.unwrap();
    assert_eq!(remixed.image_url.as_deref(), Some("data:image/jpeg;base64,ZWRpdGVk"));
    assert_eq!(remixed.narrative, narrative_before);
    assert!(!remixed.is_animating);
}

#[tokio::test(start_paused = true)]
async fn test_animate_polls_until_done() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();

    harness.backend.set_video_polls_until_done(2);
    harness.session.animate_page(first.id).await;

    let animated = harness.page_at(1).await.unwrap();
    assert_eq!(
        animated.video_url.as_deref(),
        Some("https://example.com/mock.mp4")
    );
    assert!(!animated.is_animating);
    // Two not-done polls plus the final done poll.
    assert_eq!(harness.backend.counts().video_polls, 3);
}

#[tokio::test(start_paused = true)]
async fn test_animate_gives_up_at_poll_limit() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();

    // Harness configures a 5-poll limit; never finish.
    harness.backend.set_video_polls_until_done(u32::MAX);
    harness.session.animate_page(first.id).await;

    let page = harness.page_at(1).await.unwrap();
    assert!(page.video_url.is_none());
    assert!(!page.is_animating);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_image_drops_stale_video() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;
    let first = harness.page_at(1).await.unwrap();

    harness.session.animate_page(first.id).await;
    assert!(harness.page_at(1).await.unwrap().video_url.is_some());

    harness.backend.queue_image("data:image/jpeg;base64,ZnJlc2g=");
    harness.session.regenerate_image(first.id).await;

    // The video was derived from the replaced image.
    let page = harness.page_at(1).await.unwrap();
    assert_eq!(page.image_url.as_deref(), Some("data:image/jpeg;base64,ZnJlc2g="));
    assert!(page.video_url.is_none());
}

// =============================================================================
// NARRATION
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_auto_narration_fires_when_enabled() {
    let mut config = comic_core::SessionConfig::default()
        .with_autosave_delay(Duration::from_millis(100))
        .with_video_polling(Duration::from_millis(100), 5);
    config.tts.auto_play = true;

    let mut harness = TestHarness::with_config(config);
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;

    assert_eq!(harness.backend.counts().speeches, 1);
    assert!(matches!(
        harness.session.try_next_event(),
        Some(SessionEvent::NarrationReady { .. })
    ));

    // Page completion never waited on the narration.
    assert_populated(&harness.page_at(1).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_no_narration_by_default() {
    let harness = TestHarness::new();
    harness.add_hero().await;
    harness.session.launch().await.unwrap();
    harness.settle().await;

    assert_eq!(harness.backend.counts().speeches, 0);
}
