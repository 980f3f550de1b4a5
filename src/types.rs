use serde::{Deserialize, Serialize};

use crate::utils::{new_id, now_millis};

/// Maturity classification of a character. Governs an additive style
/// directive in the system prompt; the engine performs no content filtering
/// based on it.
#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Everyone,
    #[default]
    Teen,
    Mature,
    Unrestricted,
}

impl Maturity {
    pub fn is_high(self) -> bool {
        matches!(self, Maturity::Mature | Maturity::Unrestricted)
    }
}

#[derive(Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    /// Short catchy intro shown alongside the name.
    #[serde(default)]
    pub tagline: String,
    /// Descriptive lore, free text.
    #[serde(default)]
    pub description: String,
    /// Hidden behavioral directive. Only ever enters the system prompt,
    /// never shown to the user. May contain `{{user}}` placeholders.
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default)]
    pub maturity_level: Maturity,
    /// Persistent narrative memory, target of etch/consolidate. Empty means
    /// no memory block is emitted into the prompt.
    #[serde(default)]
    pub memory: String,
    /// Opening line, may contain `{{user}}`.
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

#[derive(Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Persona {
    /// The persona seeded when the store holds none, so every session has a
    /// sender identity to label turns and fill placeholders.
    pub fn fallback_default() -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            name: "Me".into(),
            bio: "Just myself, living in the real world.".into(),
            is_default: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

/// One entry in a session transcript. Model messages carry a list of
/// candidate versions plus a cursor; `text` always mirrors the selected
/// version once generation settles.
#[derive(Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub current_version_index: usize,
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl Message {
    pub fn user(text: impl Into<String>, persona_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: Role::User,
            text: text.into(),
            versions: Vec::new(),
            current_version_index: 0,
            is_generating: false,
            persona_id: Some(persona_id.into()),
            timestamp: now_millis(),
        }
    }

    /// A settled model message with a single version.
    pub fn model(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: new_id(),
            role: Role::Model,
            text: text.clone(),
            versions: vec![text],
            current_version_index: 0,
            is_generating: false,
            persona_id: None,
            timestamp: now_millis(),
        }
    }

    /// A model message with a stream in flight. Partial text streams into
    /// `text`; `versions` stays empty until the stream settles.
    pub fn model_generating() -> Self {
        Self {
            id: new_id(),
            role: Role::Model,
            text: String::new(),
            versions: Vec::new(),
            current_version_index: 0,
            is_generating: true,
            persona_id: None,
            timestamp: now_millis(),
        }
    }

    /// Session-local annotation. Never sent to the generation service.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: Role::System,
            text: text.into(),
            versions: Vec::new(),
            current_version_index: 0,
            is_generating: false,
            persona_id: None,
            timestamp: now_millis(),
        }
    }

    /// Text of the currently selected version for model messages; `text`
    /// for everything else.
    pub fn selected_text(&self) -> &str {
        if self.role == Role::Model {
            self.versions
                .get(self.current_version_index)
                .map(String::as_str)
                .unwrap_or(&self.text)
        } else {
            &self.text
        }
    }

    /// Repair a message deserialized from the store so the invariants hold.
    /// A generating flag on a loaded message means the host died mid-stream;
    /// the partial text is settled as a best-effort version.
    pub fn normalize(&mut self) {
        match self.role {
            Role::User | Role::System => {
                self.versions.clear();
                self.current_version_index = 0;
                self.is_generating = false;
            }
            Role::Model => {
                if self.is_generating {
                    self.is_generating = false;
                    self.versions.push(std::mem::take(&mut self.text));
                }
                if self.versions.is_empty() {
                    self.versions.push(self.text.clone());
                }
                if self.current_version_index >= self.versions.len() {
                    self.current_version_index = self.versions.len() - 1;
                }
                self.text = self.versions[self.current_version_index].clone();
            }
        }
    }
}

#[derive(Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub character_id: String,
    /// Exactly one persona is active per session; switching only affects
    /// future turns.
    #[serde(default)]
    pub active_persona_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub last_active: u64,
    #[serde(default)]
    pub created_at: u64,
}

impl ChatSession {
    pub fn new(character_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            character_id: character_id.into(),
            active_persona_id: None,
            messages: Vec::new(),
            last_active: now,
            created_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = now_millis();
    }

    /// At most one message may be generating at any instant.
    pub fn is_generating(&self) -> bool {
        self.messages.iter().any(|m| m.is_generating)
    }

    pub fn message_index(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn normalize(&mut self) {
        for message in &mut self.messages {
            message.normalize();
        }
    }
}
