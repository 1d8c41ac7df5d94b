//! Gemini-backed implementation of the backend contract.
//!
//! Owns every prompt the comic sends to the generative models and the
//! tolerant decoding of what comes back. The orchestrator never sees raw
//! model output; it sees domain types or a classified [`BackendError`].

use crate::backend::{
    BackendError, BiosRequest, ChatRequest, ImageRequest, PageContext, StoryBackend, VideoHandle,
    VideoStatus,
};
use crate::beat::{decode_beat, strip_code_fences, Beat, DecodeError};
use crate::graph::{BubbleKind, LetterItem, PageType, Sentiment};
use crate::persona::{CharacterBios, Persona, PersonaRegistry};
use crate::settings::genre_keywords;
use crate::world::WorldState;
use async_trait::async_trait;
use gemini::{
    GenerateRequest, Gemini, Part, VideoRequest, DEFAULT_IMAGE_EDIT_MODEL, DEFAULT_IMAGE_MODEL,
    DEFAULT_TEXT_MODEL, DEFAULT_TTS_MODEL, DEFAULT_VIDEO_MODEL,
};

/// Fixed scene used for back-cover art, which has no beat of its own.
pub const BACK_COVER_SCENE: &str = "Epic back cover art featuring the hero's journey";

/// Backend implementation over the Gemini API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Gemini,
}

impl GeminiBackend {
    pub fn new(client: Gemini) -> Self {
        Self { client }
    }

    /// Create a backend from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self::new(Gemini::from_env()?))
    }

    fn build_beat_prompt(context: &PageContext) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are a master comic book scriptwriter. This is Page {} of {}.\n",
            context.page_number, context.total_pages
        ));
        prompt.push_str(&format!("GENRE: {}. TONE: {}.\n", context.genre, context.tone));
        prompt.push_str(&format!("LANGUAGE: {}.\n", context.language));
        if !context.premise.is_empty() {
            prompt.push_str(&format!("STORY PREMISE: {}\n", context.premise));
        }

        prompt.push_str("\nWORLD STATE:\n");
        prompt.push_str(&world_lines(&context.world));

        prompt.push_str("\nCHARACTERS:\n");
        prompt.push_str(&character_lineup(&context.personas));

        prompt.push_str(&dialogue_history(context));

        let last = context.history.last();
        let previous_scene = last
            .map(|entry| entry.scene.as_str())
            .filter(|scene| !scene.is_empty())
            .unwrap_or("The story begins...");
        let decision = last
            .and_then(|entry| entry.resolved_choice.as_deref())
            .unwrap_or("N/A");
        prompt.push_str(&format!("\nPREVIOUS PLOT POINT: \"{previous_scene}\"\n"));
        prompt.push_str(&format!("USER DECISION: \"{decision}\"\n"));

        prompt.push_str("\nINSTRUCTIONS:\n");
        prompt.push_str("1. Advance the plot logically based on the USER DECISION.\n");
        prompt.push_str("2. Maintain STRICT DIALOGUE CONTINUITY. New speech bubbles must feel like a direct response to the RECENT CONVERSATION HISTORY.\n");
        prompt.push_str("3. Update WORLD STATE if the hero finds an item or gets injured.\n");
        prompt.push_str("4. Ensure character voices are distinct and consistent with their personas.\n");
        prompt.push_str("5. SCENE DESCRIPTION must be a VISUAL-ONLY description for an artist. CLEAN ART, NO TEXT.\n");
        if context.rich_mode {
            prompt.push_str("6. Include at least one caption and one sound effect alongside the dialogue.\n");
        }
        if context.is_decision_page {
            prompt.push_str(
                "This page is a DECISION PAGE: end on a cliffhanger and offer exactly 2 bold, distinct choices.\n",
            );
        } else {
            prompt.push_str("This page is not a decision page: \"choices\" must be an empty array.\n");
        }

        prompt.push_str(
            r#"
RETURN JSON:
{
  "scene": "Cinematic visual description. NO TEXT in image.",
  "focus_char": "hero"|"friend"|"villain"|"other",
  "bubbles": [
     { "id": "1", "text": "Dialogue...", "type": "speech"|"caption"|"thought"|"sfx", "character": "Name", "x": 50, "y": 10 }
  ],
  "world_update": {
      "add_items": ["Item Name"],
      "remove_items": ["Item Name"],
      "add_status": ["Status"],
      "remove_status": ["Status"]
  },
  "choices": ["Next Option A", "Next Option B"]
}
"#,
        );

        prompt
    }

    fn build_image_parts(request: &ImageRequest) -> Vec<Part> {
        let mut parts = Vec::new();
        push_portrait(&mut parts, "HERO", request.personas.hero.as_ref());
        push_portrait(&mut parts, "ALLY", request.personas.friend.as_ref());
        push_portrait(&mut parts, "VILLAIN", request.personas.villain.as_ref());

        let mut context = String::new();
        if !request.world.inventory.is_empty() {
            context.push_str(&format!(
                " The hero is currently using: {}.",
                request.world.inventory.join(", ")
            ));
        }
        if !request.world.status.is_empty() {
            context.push_str(&format!(
                " Character visual state: {}.",
                request.world.status.join(", ")
            ));
        }

        let mut prompt = format!(
            "ART STYLE: {}. GENRE: {}. LANGUAGE: {}.{context}",
            request.art_style, request.genre, request.language
        );
        match (&request.scene, request.page_type) {
            (_, PageType::Cover) => {
                prompt.push_str(
                    " HIGH-END COMIC COVER ART. Dynamic cinematic lighting, epic composition. CLEAN ART. NO TEXT, NO SPEECH BUBBLES.",
                );
            }
            (Some(scene), _) => {
                prompt.push_str(&format!(
                    " SCENE: {scene}. **MANDATORY: CLEAN TEXT-FREE ART. NO DIALOGUE, NO BUBBLES.**"
                ));
            }
            (None, _) => {
                prompt.push_str(" CLEAN TEXT-FREE ART. NO DIALOGUE, NO BUBBLES.");
            }
        }

        parts.push(Part::text(prompt));
        parts
    }
}

#[async_trait]
impl StoryBackend for GeminiBackend {
    async fn generate_beat(&self, context: &PageContext) -> Result<Beat, BackendError> {
        let request =
            GenerateRequest::from_text(Self::build_beat_prompt(context)).with_json_output();
        let response = self.client.generate_content(DEFAULT_TEXT_MODEL, request).await?;
        Ok(decode_beat(&response.text(), context.is_decision_page)?)
    }

    async fn revise_beat(&self, beat: &Beat, instruction: &str) -> Result<Beat, BackendError> {
        let current = serde_json::to_string_pretty(beat)
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        let prompt = format!(
            r#"You are a comic book editor revising a script.
Current Panel Data:
{current}

User Instruction: "{instruction}"

Task: Rewrite the 'scene', 'bubbles', and 'choices' (if applicable) based on the instruction while keeping the overall story arc consistent.
Keep the JSON structure exactly the same.
Ensure 'scene' is a visual description.
**CRITICAL: The scene must remain TEXT-FREE.**

RETURN JSON ONLY.
"#
        );

        let request = GenerateRequest::from_text(prompt).with_json_output();
        let response = self.client.generate_content(DEFAULT_TEXT_MODEL, request).await?;
        // Decode with the page's own decision-ness so a revised decision
        // page keeps carrying choices.
        let is_decision = !beat.choices.is_empty();
        Ok(decode_beat(&response.text(), is_decision)?)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, BackendError> {
        let api_request =
            GenerateRequest::from_parts(Self::build_image_parts(request)).with_aspect_ratio("3:4");
        let response = self
            .client
            .generate_content(DEFAULT_IMAGE_MODEL, api_request)
            .await?;

        let data = response
            .inline_data()
            .ok_or_else(|| BackendError::Malformed("no image data in response".to_string()))?;
        Ok(data_url(&data.mime_type, &data.data))
    }

    async fn edit_image(&self, base64: &str, instruction: &str) -> Result<String, BackendError> {
        let parts = vec![
            Part::inline_data("image/jpeg", base64),
            Part::text(format!("{instruction}. Preserve character consistency. NO TEXT.")),
        ];
        let response = self
            .client
            .generate_content(DEFAULT_IMAGE_EDIT_MODEL, GenerateRequest::from_parts(parts))
            .await?;

        let data = response
            .inline_data()
            .ok_or_else(|| BackendError::Malformed("no image data in response".to_string()))?;
        Ok(data_url(&data.mime_type, &data.data))
    }

    async fn start_video(
        &self,
        base64: &str,
        scene_hint: &str,
        is_cover: bool,
    ) -> Result<VideoHandle, BackendError> {
        let prompt = if is_cover {
            "Cinematic slow-motion comic cover, breathing life into the characters, epic mood lighting, 4k. NO TEXT.".to_string()
        } else {
            format!("Motion comic style, subtle parallax animation, 4k, {scene_hint}. NO TEXT.")
        };

        let operation = self
            .client
            .start_video(
                DEFAULT_VIDEO_MODEL,
                VideoRequest::from_image(prompt, "image/jpeg", base64),
            )
            .await?;
        Ok(VideoHandle {
            operation: operation.name,
        })
    }

    async fn poll_video(&self, handle: &VideoHandle) -> Result<VideoStatus, BackendError> {
        let operation = self.client.poll_operation(&handle.operation).await?;
        Ok(VideoStatus {
            done: operation.done,
            video_uri: operation.video_uri().map(str::to_string),
        })
    }

    async fn generate_speech(&self, text: &str, voice: &str) -> Result<String, BackendError> {
        let request = GenerateRequest::from_text(text).with_audio_output(voice);
        let response = self.client.generate_content(DEFAULT_TTS_MODEL, request).await?;

        let data = response
            .inline_data()
            .ok_or_else(|| BackendError::Malformed("no audio data in response".to_string()))?;
        Ok(data.data.clone())
    }

    async fn generate_letters(
        &self,
        summary: &str,
        language: &str,
    ) -> Result<Vec<LetterItem>, BackendError> {
        let prompt = format!(
            "Story Summary: {summary}. Write 3 fictional fan letters in {language} from passionate comic fans. JSON: [{{user, location, text, sentiment (\"positive\"|\"negative\"|\"confused\")}}]"
        );
        let request = GenerateRequest::from_text(prompt).with_json_output();
        let response = self.client.generate_content(DEFAULT_TEXT_MODEL, request).await?;

        // A garbled letters page is not worth failing the issue over.
        Ok(decode_letters(&response.text()).unwrap_or_else(|error| {
            log::warn!("fan letters were malformed, substituting placeholder: {error}");
            fallback_letters()
        }))
    }

    async fn generate_bios(&self, request: &BiosRequest) -> Result<CharacterBios, BackendError> {
        let mut roster = "Hero".to_string();
        if request.has_friend {
            roster.push_str(", Friend");
        }
        if request.has_villain {
            roster.push_str(", Villain");
        }
        let prompt = format!(
            "GENRE: {}. TONE: {}. Generate JSON dossiers for {roster} in {}. Focus on dramatic motivations and unique character quirks that fit the {} setting. JSON: {{\"hero\": {{\"name\", \"backstory\"}}, \"friend\": {{...}}, \"villain\": {{...}}}}",
            request.genre, request.tone, request.language, request.genre
        );

        let api_request = GenerateRequest::from_text(prompt).with_json_output();
        let response = self
            .client
            .generate_content(DEFAULT_TEXT_MODEL, api_request)
            .await?;
        Ok(decode_bios(&response.text())?)
    }

    async fn generate_persona(
        &self,
        desc: &str,
        art_style: &str,
        genre: &str,
    ) -> Result<Persona, BackendError> {
        let prompt = format!(
            "Full body concept art of {desc} in a {genre} setting.\nVisual cues: {}.\nArt Style: {art_style}.\nNeutral background, no text, character design sheet quality.",
            genre_keywords(genre)
        );
        let request = GenerateRequest::from_text(prompt).with_aspect_ratio("1:1");
        let response = self
            .client
            .generate_content(DEFAULT_IMAGE_MODEL, request)
            .await?;

        let data = response
            .inline_data()
            .ok_or_else(|| BackendError::Malformed("no portrait data in response".to_string()))?;
        Ok(Persona::new(data.data.clone(), desc))
    }

    async fn character_reply(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let prompt = format!(
            r#"You are {}, the {} of a {} comic book.
Your Backstory: {}

The current scene in the story is: "{}"
A reader is speaking to you directly or giving you a command.

Reader's message: "{}"

INSTRUCTIONS:
1. Respond purely in character.
2. Use the tone appropriate for your genre and backstory.
3. Keep it relatively brief, like a comic book speech bubble (under 50 words).
4. Respond in {}.

ONLY return the text of your response.
"#,
            request.persona.display_name(),
            request.role,
            request.genre,
            request.persona.backstory.as_deref().unwrap_or("Unknown"),
            request.scene,
            request.message,
            request.language,
        );

        let response = self
            .client
            .generate_content(DEFAULT_TEXT_MODEL, GenerateRequest::from_text(prompt))
            .await?;
        let text = response.text();
        if text.trim().is_empty() {
            Ok("I have nothing to say to you, mortal.".to_string())
        } else {
            Ok(text)
        }
    }
}

/// Decode the fan-letters array from raw model output.
pub fn decode_letters(raw: &str) -> Result<Vec<LetterItem>, DecodeError> {
    let letters: Vec<LetterItem> = serde_json::from_str(strip_code_fences(raw))?;
    Ok(letters)
}

/// The placeholder letter shown when the model's letters are unusable.
pub fn fallback_letters() -> Vec<LetterItem> {
    vec![LetterItem {
        user: "A Devoted Reader".to_string(),
        location: "Parts Unknown".to_string(),
        text: "I haven't stopped thinking about this issue since I put it down. More, please!".to_string(),
        sentiment: Sentiment::Positive,
    }]
}

/// Decode the bios object from raw model output.
pub fn decode_bios(raw: &str) -> Result<CharacterBios, DecodeError> {
    let bios: CharacterBios = serde_json::from_str(strip_code_fences(raw))?;
    Ok(bios)
}

fn data_url(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

fn world_lines(world: &WorldState) -> String {
    let inventory = if world.inventory.is_empty() {
        "INVENTORY: Empty.".to_string()
    } else {
        format!("INVENTORY: {}.", world.inventory.join(", "))
    };
    let status = if world.status.is_empty() {
        "STATUS: Healthy.".to_string()
    } else {
        format!("STATUS: {}.", world.status.join(", "))
    };
    format!("{inventory}\n{status}\n")
}

fn character_lineup(personas: &PersonaRegistry) -> String {
    let mut lineup = String::new();
    if let Some(hero) = &personas.hero {
        lineup.push_str(&format!("HERO: {}", hero.display_name()));
        if let Some(backstory) = &hero.backstory {
            lineup.push_str(&format!(" (Persona: {backstory})"));
        }
        lineup.push('\n');
    }
    if let Some(friend) = &personas.friend {
        lineup.push_str(&format!("ALLY: {}", friend.display_name()));
        if let Some(backstory) = &friend.backstory {
            lineup.push_str(&format!(" (Persona: {backstory})"));
        }
        lineup.push('\n');
    }
    if let Some(villain) = &personas.villain {
        lineup.push_str(&format!("VILLAIN: {}", villain.display_name()));
        if let Some(backstory) = &villain.backstory {
            lineup.push_str(&format!(" (Persona: {backstory})"));
        }
        lineup.push('\n');
    }
    lineup
}

/// The last three story pages that carried dialogue, formatted as a
/// conversation transcript so the model can keep continuity.
fn dialogue_history(context: &PageContext) -> String {
    let recent: Vec<_> = context
        .history
        .iter()
        .filter(|entry| !entry.bubbles.is_empty())
        .rev()
        .take(3)
        .collect();
    if recent.is_empty() {
        return String::new();
    }

    let mut transcript = "\nRECENT CONVERSATION HISTORY:\n".to_string();
    for entry in recent.into_iter().rev() {
        transcript.push_str(&format!("[Page {}]\n", entry.page_index));
        for bubble in &entry.bubbles {
            if matches!(bubble.kind, BubbleKind::Speech | BubbleKind::Thought) {
                let speaker = bubble.character.as_deref().unwrap_or("NARRATOR");
                transcript.push_str(&format!("  {speaker}: \"{}\"\n", bubble.text));
            }
        }
    }
    transcript
}

fn push_portrait(parts: &mut Vec<Part>, label: &str, persona: Option<&Persona>) {
    if let Some(persona) = persona {
        if !persona.base64.is_empty() {
            parts.push(Part::text(format!("Visual Reference [{label}]:")));
            parts.push(Part::inline_data("image/jpeg", persona.base64.clone()));
        }
    }
}
