//! History normalization.
//!
//! The generation service takes a strict alternating turn list that must
//! begin with a user turn and never repeats a role. Stored transcripts are
//! looser than that: session-local system annotations, in-flight messages,
//! several user messages with no reply in between, and a seeded greeting all
//! occur. This module flattens a transcript into the shape the service
//! accepts, deterministically and without touching session state.

use serde::Serialize;

use crate::persona::resolve_persona;
use crate::types::{Message, Persona, Role};

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One role-tagged unit of dialogue as sent to the generation service.
#[derive(Serialize, Clone, PartialEq, Eq, Debug)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Flatten a message sequence into the service's turn list.
///
/// Rules, in order: drop system and in-flight messages; use each model
/// message's selected version; label user turns with the authoring persona;
/// merge consecutive same-role turns with a blank line; trim everything
/// before the first user turn. An un-normalizable history (e.g. only a
/// dangling model turn) yields an empty list, which callers treat as
/// "nothing to send yet" rather than an error.
pub fn normalize_history(messages: &[Message], personas: &[Persona]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for message in messages {
        if message.role == Role::System || message.is_generating {
            continue;
        }

        let (role, text) = match message.role {
            Role::User => {
                let label = resolve_persona(personas, message.persona_id.as_deref())
                    .map(|p| p.name.as_str())
                    .unwrap_or("User");
                (TurnRole::User, format!("[{}]: {}", label, message.text))
            }
            Role::Model => (TurnRole::Model, message.selected_text().to_string()),
            Role::System => unreachable!(),
        };

        // A model message whose only version is empty (failed stream with no
        // partial) contributes nothing.
        if message.role == Role::Model && text.trim().is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == role => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
            }
            _ => turns.push(Turn { role, text }),
        }
    }

    match turns.iter().position(|t| t.role == TurnRole::User) {
        Some(first_user) => {
            turns.drain(..first_user);
        }
        None => turns.clear(),
    }

    turns
}
