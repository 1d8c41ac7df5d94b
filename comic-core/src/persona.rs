//! Recurring character records.
//!
//! Up to three personas (hero, friend, villain) are created at setup time
//! and injected into every generation request so the art and narration stay
//! consistent across pages. The registry owns each portrait; bios filled in
//! later merge around it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three recurring character slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaSlot {
    Hero,
    Friend,
    Villain,
}

impl PersonaSlot {
    /// The role label used in prompts.
    pub fn role(&self) -> &'static str {
        match self {
            PersonaSlot::Hero => "hero",
            PersonaSlot::Friend => "friend",
            PersonaSlot::Villain => "villain",
        }
    }
}

impl fmt::Display for PersonaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role())
    }
}

/// A recurring character: portrait plus description, with name and
/// backstory filled in by a later bios call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Base64-encoded portrait, shared by reference into generation
    /// requests that mention this character.
    pub base64: String,

    /// Short visual description the portrait was generated from.
    pub desc: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub backstory: Option<String>,
}

impl Persona {
    pub fn new(base64: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            desc: desc.into(),
            name: None,
            backstory: None,
        }
    }

    /// The name to show in prompts, falling back to the description.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.desc)
    }
}

/// A generated name/backstory pair for one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BioEntry {
    pub name: String,
    pub backstory: String,
}

/// The result of a batch bios generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterBios {
    #[serde(default)]
    pub hero: Option<BioEntry>,

    #[serde(default)]
    pub friend: Option<BioEntry>,

    #[serde(default)]
    pub villain: Option<BioEntry>,
}

/// Mutable store for the three persona slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaRegistry {
    #[serde(default)]
    pub hero: Option<Persona>,

    #[serde(default)]
    pub friend: Option<Persona>,

    #[serde(default)]
    pub villain: Option<Persona>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a slot.
    pub fn set(&mut self, slot: PersonaSlot, persona: Option<Persona>) {
        match slot {
            PersonaSlot::Hero => self.hero = persona,
            PersonaSlot::Friend => self.friend = persona,
            PersonaSlot::Villain => self.villain = persona,
        }
    }

    pub fn get(&self, slot: PersonaSlot) -> Option<&Persona> {
        match slot {
            PersonaSlot::Hero => self.hero.as_ref(),
            PersonaSlot::Friend => self.friend.as_ref(),
            PersonaSlot::Villain => self.villain.as_ref(),
        }
    }

    /// Hero presence gates story launch.
    pub fn has_hero(&self) -> bool {
        self.hero.is_some()
    }

    /// Merge generated bios into the populated slots.
    ///
    /// Only name and backstory change; portraits are never overwritten,
    /// and bios for empty slots are discarded.
    pub fn apply_bios(&mut self, bios: &CharacterBios) {
        let slots = [
            (&mut self.hero, &bios.hero),
            (&mut self.friend, &bios.friend),
            (&mut self.villain, &bios.villain),
        ];
        for (persona, bio) in slots {
            if let (Some(persona), Some(bio)) = (persona.as_mut(), bio.as_ref()) {
                persona.name = Some(bio.name.clone());
                persona.backstory = Some(bio.backstory.clone());
            }
        }
    }

    /// Clear every slot. Only a full reset does this.
    pub fn clear(&mut self) {
        self.hero = None;
        self.friend = None;
        self.villain = None;
    }
}
