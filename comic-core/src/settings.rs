//! Session settings and the fixed issue plan.
//!
//! An issue always follows the same page plan: a cover, ten story pages,
//! a fan-letters page, and a back cover. Branching choices are offered at
//! fixed positions in that plan.

use serde::{Deserialize, Serialize};

/// Number of story pages in one issue.
pub const MAX_STORY_PAGES: u32 = 10;

/// Page index of the fan-letters page.
pub const LETTERS_PAGE: u32 = 11;

/// Page index of the back cover.
pub const BACK_COVER_PAGE: u32 = 12;

/// Total page count including cover, letters, and back cover.
pub const TOTAL_PAGES: u32 = 12;

/// Page indices at which the reader is offered a branching choice.
pub const DECISION_PAGES: [u32; 4] = [3, 5, 7, 9];

/// Whether the given page index is a decision page.
pub fn is_decision_page(page_index: u32) -> bool {
    DECISION_PAGES.contains(&page_index)
}

/// Available story genres.
pub const GENRES: [&str; 9] = [
    "Classic Horror",
    "Superhero Action",
    "Dark Sci-Fi",
    "High Fantasy",
    "Neon Noir Detective",
    "Wasteland Apocalypse",
    "Lighthearted Comedy",
    "Teen Drama / Slice of Life",
    "Custom",
];

/// Available art styles.
pub const ART_STYLES: [&str; 16] = [
    "Modern American (Vibrant)",
    "Silver Age (Vintage 1960s)",
    "Golden Age (Vintage 1940s)",
    "Manga (Standard B&W)",
    "Manga (Retro 90s Anime)",
    "Franco-Belgian (Ligne Claire)",
    "European (Moebius Sci-Fi)",
    "Noir (High Contrast B&W)",
    "Pulp Magazine (Rough)",
    "Painted (Alex Ross Style)",
    "Watercolor (Dreamy)",
    "Paper Cutout (Collage)",
    "8-Bit Pixel Art",
    "Claymation",
    "Abstract Expressionism",
    "Chalkboard Sketch",
];

/// Available narrative tones.
pub const TONES: [&str; 6] = [
    "ACTION-HEAVY",
    "INNER-MONOLOGUE",
    "QUIPPY",
    "OPERATIC",
    "CASUAL",
    "WHOLESOME",
];

/// Supported languages as (code, display name) pairs.
pub const LANGUAGES: [(&str, &str); 12] = [
    ("en-US", "English (US)"),
    ("es-MX", "Spanish (Mexico)"),
    ("ja-JP", "Japanese (Japan)"),
    ("fr-FR", "French (France)"),
    ("de-DE", "German (Germany)"),
    ("pt-BR", "Portuguese (Brazil)"),
    ("zh-CN", "Chinese (China)"),
    ("it-IT", "Italian (Italy)"),
    ("ru-RU", "Russian (Russia)"),
    ("ko-KR", "Korean (South Korea)"),
    ("hi-IN", "Hindi (India)"),
    ("ar-EG", "Arabic (Egypt)"),
];

/// Display name for a language code, falling back to English.
pub fn language_name(code: &str) -> &'static str {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("English (US)")
}

/// Visual keywords that flavor character and scene prompts per genre.
pub fn genre_keywords(genre: &str) -> &'static str {
    match genre {
        "Classic Horror" => "Gothic, macabre, Victorian attire, eerie lighting, shadow-heavy.",
        "Superhero Action" => {
            "Iconic spandex costume, muscular, heroic stance, bright primary colors."
        }
        "Dark Sci-Fi" => "Cybernetic enhancements, visor, tactical heavy armor, weathered metal.",
        "High Fantasy" => "Mythical plate armor, enchanted glowing weapons, ornate leather.",
        "Neon Noir Detective" => "Classic trench coat, glowing neon accents, rainy atmosphere.",
        "Wasteland Apocalypse" => {
            "Rugged scavenged gear, desert goggles, spiked armor, dusty textures."
        }
        _ => "Distinctive clothing, clear silhouette.",
    }
}

/// Settings chosen at setup time that shape every generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Story genre.
    pub genre: String,

    /// Art style for all rendered panels.
    pub art_style: String,

    /// Language code (see [`LANGUAGES`]).
    pub language: String,

    /// Narrative tone.
    pub tone: String,

    /// Optional custom premise steering the opening pages.
    pub premise: String,

    /// Whether to ask for denser captions and sound effects.
    pub rich_mode: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            genre: GENRES[0].to_string(),
            art_style: ART_STYLES[0].to_string(),
            language: LANGUAGES[0].0.to_string(),
            tone: TONES[0].to_string(),
            premise: String::new(),
            rich_mode: true,
        }
    }
}

impl SessionSettings {
    /// Set the genre.
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    /// Set the art style.
    pub fn with_art_style(mut self, art_style: impl Into<String>) -> Self {
        self.art_style = art_style.into();
        self
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the narrative tone.
    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    /// Set a custom premise.
    pub fn with_premise(mut self, premise: impl Into<String>) -> Self {
        self.premise = premise.into();
        self
    }

    /// Enable or disable rich mode.
    pub fn with_rich_mode(mut self, rich_mode: bool) -> Self {
        self.rich_mode = rich_mode;
        self
    }

    /// Display name of the configured language.
    pub fn language_name(&self) -> &'static str {
        language_name(&self.language)
    }
}

/// Read-aloud settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Speak each new page's bubbles automatically.
    pub auto_play: bool,

    /// Voice used for narration and characters without a fixed voice.
    pub default_voice: String,

    /// Playback speed multiplier (0.5 to 2.0).
    pub playback_speed: f32,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            auto_play: false,
            default_voice: "Kore".to_string(),
            playback_speed: 1.0,
        }
    }
}
