//! Narrative beats and the strict decode of model output.
//!
//! The backend returns beats as JSON text. Models occasionally wrap the
//! payload in code fences, drop optional fields, or return fewer choices
//! than a decision page needs; [`decode_beat`] tolerates all of that with
//! explicit, documented defaults while still rejecting output that lacks
//! the one field nothing can substitute for - the scene description.

use crate::graph::Bubble;
use crate::world::WorldUpdate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Choices substituted when a decision page comes back with fewer than two.
pub const FALLBACK_CHOICES: [&str; 2] = ["Push Forward", "Wait and See"];

/// Errors from decoding backend output.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("beat is missing a scene description")]
    MissingScene,
}

/// Which recurring character the panel centers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusChar {
    Hero,
    Friend,
    Villain,
    Other,
}

impl FocusChar {
    /// Parse a model-supplied tag, defaulting to `Other` for anything
    /// unrecognized.
    pub fn parse(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "hero" => FocusChar::Hero,
            "friend" => FocusChar::Friend,
            "villain" => FocusChar::Villain,
            _ => FocusChar::Other,
        }
    }

    /// The fixed narration voice for this character, if it has one.
    ///
    /// `Other` falls back to the reader-configured default voice.
    pub fn voice(&self) -> Option<&'static str> {
        match self {
            FocusChar::Hero => Some("Fenrir"),
            FocusChar::Friend => Some("Puck"),
            FocusChar::Villain => Some("Charon"),
            FocusChar::Other => None,
        }
    }
}

/// The atomic unit of generated narrative for one story page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Visual-only prose driving art generation; mandated text-free.
    pub scene: String,

    /// Character the panel centers on.
    #[serde(default = "default_focus")]
    pub focus_char: FocusChar,

    /// Dialogue and caption overlays.
    #[serde(default)]
    pub bubbles: Vec<Bubble>,

    /// Forward options; populated only on decision pages.
    #[serde(default)]
    pub choices: Vec<String>,

    /// World-state delta to apply when this beat is accepted.
    #[serde(default)]
    pub world_update: WorldUpdate,
}

fn default_focus() -> FocusChar {
    FocusChar::Other
}

/// Strip markdown code fences the model sometimes wraps JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Decode a beat from raw model output.
///
/// Defaults applied:
/// - missing/malformed `bubbles`, `choices`, `world_update` become empty
/// - unrecognized `focus_char` becomes `Other`
/// - a decision page with fewer than two choices gets [`FALLBACK_CHOICES`]
/// - a non-decision page always gets an empty choice list
///
/// A missing or empty `scene` is unrecoverable and fails the decode.
pub fn decode_beat(raw: &str, is_decision_page: bool) -> Result<Beat, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw))?;

    let scene = value
        .get("scene")
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingScene)?
        .to_string();

    let focus_char = value
        .get("focus_char")
        .and_then(|f| f.as_str())
        .map(FocusChar::parse)
        .unwrap_or(FocusChar::Other);

    let bubbles: Vec<Bubble> = value
        .get("bubbles")
        .cloned()
        .and_then(|b| serde_json::from_value(b).ok())
        .unwrap_or_default();

    let mut choices: Vec<String> = value
        .get("choices")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if is_decision_page {
        if choices.len() < 2 {
            choices = FALLBACK_CHOICES.iter().map(|c| c.to_string()).collect();
        }
    } else {
        choices.clear();
    }

    let world_update: WorldUpdate = value
        .get("world_update")
        .cloned()
        .and_then(|w| serde_json::from_value(w).ok())
        .unwrap_or_default();

    Ok(Beat {
        scene,
        focus_char,
        bubbles,
        choices,
        world_update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BubbleKind;

    #[test]
    fn test_decode_full_beat() {
        let raw = r#"{
            "scene": "The hero stands on a cliff at dawn.",
            "focus_char": "hero",
            "bubbles": [
                {"id": "1", "text": "We made it.", "type": "speech", "character": "Aria", "x": 40, "y": 15}
            ],
            "world_update": {"add_items": ["Lantern"]},
            "choices": ["Climb down", "Light the lantern"]
        }"#;

        let beat = decode_beat(raw, true).unwrap();
        assert_eq!(beat.scene, "The hero stands on a cliff at dawn.");
        assert_eq!(beat.focus_char, FocusChar::Hero);
        assert_eq!(beat.bubbles.len(), 1);
        assert_eq!(beat.bubbles[0].kind, BubbleKind::Speech);
        assert_eq!(beat.world_update.add_items, vec!["Lantern"]);
        assert_eq!(beat.choices, vec!["Climb down", "Light the lantern"]);
    }

    #[test]
    fn test_decode_strips_code_fences() {
        let raw = "```json\n{\"scene\": \"A quiet alley.\"}\n```";
        let beat = decode_beat(raw, false).unwrap();
        assert_eq!(beat.scene, "A quiet alley.");
    }

    #[test]
    fn test_decode_defaults_optional_fields() {
        let beat = decode_beat(r#"{"scene": "A storm gathers."}"#, false).unwrap();
        assert_eq!(beat.focus_char, FocusChar::Other);
        assert!(beat.bubbles.is_empty());
        assert!(beat.choices.is_empty());
        assert!(beat.world_update.is_empty());
    }

    #[test]
    fn test_decode_invalid_focus_char_defaults() {
        let beat = decode_beat(
            r#"{"scene": "Fog.", "focus_char": "narrator"}"#,
            false,
        )
        .unwrap();
        assert_eq!(beat.focus_char, FocusChar::Other);
    }

    #[test]
    fn test_decode_decision_page_fallback_choices() {
        let beat = decode_beat(
            r#"{"scene": "A fork in the road.", "choices": ["Only one"]}"#,
            true,
        )
        .unwrap();
        assert_eq!(
            beat.choices,
            vec!["Push Forward".to_string(), "Wait and See".to_string()]
        );
    }

    #[test]
    fn test_decode_non_decision_page_clears_choices() {
        let beat = decode_beat(
            r#"{"scene": "A chase.", "choices": ["Left", "Right"]}"#,
            false,
        )
        .unwrap();
        assert!(beat.choices.is_empty());
    }

    #[test]
    fn test_decode_missing_scene_fails() {
        assert!(matches!(
            decode_beat(r#"{"focus_char": "hero"}"#, false),
            Err(DecodeError::MissingScene)
        ));
        assert!(matches!(
            decode_beat(r#"{"scene": "   "}"#, false),
            Err(DecodeError::MissingScene)
        ));
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        assert!(matches!(
            decode_beat("the model rambled instead", false),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_malformed_bubbles_default_empty() {
        let beat = decode_beat(
            r#"{"scene": "Rain.", "bubbles": "not an array"}"#,
            false,
        )
        .unwrap();
        assert!(beat.bubbles.is_empty());
    }

    #[test]
    fn test_focus_char_voices() {
        assert_eq!(FocusChar::Hero.voice(), Some("Fenrir"));
        assert_eq!(FocusChar::Friend.voice(), Some("Puck"));
        assert_eq!(FocusChar::Villain.voice(), Some("Charon"));
        assert_eq!(FocusChar::Other.voice(), None);
    }
}
