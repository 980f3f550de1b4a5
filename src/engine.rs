//! Session orchestration.
//!
//! `ChatEngine` ties the store, the generation service, and the streaming
//! machinery together. Every operation follows the same shape: load records,
//! validate, mutate, write back, emit an event. State lives in the store;
//! the engine itself only tracks which sessions have a stream in flight.
//!
//! Mutual exclusion is per session and cooperative: while a generation is in
//! flight, further mutating calls for that session are rejected with
//! [`EngineError::Busy`] rather than queued. Sessions without a stream are
//! untouched by each other's traffic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::abort::AbortRegistry;
use crate::branching::{self, NavigateDirection, NavigateOutcome};
use crate::config::EngineConfig;
use crate::context::normalize_history;
use crate::error::{EngineError, Result};
use crate::memory;
use crate::persona::resolve_persona;
use crate::prompt::{build_system_prompt, render_greeting};
use crate::provider::{GenerationOptions, GenerationRequest, GenerationService};
use crate::store::SessionStore;
use crate::streaming::run_stream;
use crate::types::{ChatSession, Message, Persona, Role};

/// Notifications pushed to the embedding host as state changes land in the
/// store. Receivers reload the named record; events carry ids, not payloads.
#[derive(Serialize, Clone, PartialEq, Eq, Debug)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    SessionUpdated { session_id: String },
    CharacterUpdated { character_id: String },
    CapacityReached { session_id: String, message_id: String },
    Toast { message: String },
}

/// Clears the in-flight mark when an operation ends, on every exit path.
struct FlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct ChatEngine {
    store: SessionStore,
    service: Arc<dyn GenerationService>,
    config: EngineConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
    aborts: AbortRegistry,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ChatEngine {
    pub fn new(
        store: SessionStore,
        service: Arc<dyn GenerationService>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                service,
                config,
                events,
                aborts: AbortRegistry::new(),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn emit(&self, event: EngineEvent) {
        // the host may have dropped its receiver; state is already durable
        let _ = self.events.send(event);
    }

    fn session_updated(&self, session_id: &str) {
        self.emit(EngineEvent::SessionUpdated {
            session_id: session_id.to_string(),
        });
    }

    /// Mark a session as having a mutation in progress, or reject.
    fn claim(&self, session_id: &str) -> Result<FlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| EngineError::Store("in-flight lock poisoned".into()))?;
        if !set.insert(session_id.to_string()) {
            return Err(EngineError::Busy);
        }
        Ok(FlightGuard {
            set: self.in_flight.clone(),
            key: session_id.to_string(),
        })
    }

    fn active_persona(&self, personas: &[Persona], active_id: Option<&str>) -> Result<Persona> {
        resolve_persona(personas, active_id)
            .cloned()
            .ok_or_else(|| EngineError::PersonaNotFound("no personas available".into()))
    }

    /// Return the most recent session for a character, creating and seeding
    /// one when none exists yet.
    ///
    /// Adoption is the invariant-repair boundary: a stored session whose
    /// stream died with the host is settled here (partial text becomes a
    /// version, the generating flag clears) and written back. Mid-operation
    /// loads elsewhere read the stored state verbatim.
    pub fn open_session(&self, character_id: &str) -> Result<ChatSession> {
        let character = self.store.find_character(character_id)?;
        if let Some(mut session) = self.store.find_session_for_character(character_id)? {
            let live = self
                .in_flight
                .lock()
                .map(|set| set.contains(&session.id))
                .unwrap_or(false);
            if !live && session.is_generating() {
                // the host died mid-stream on a previous run
                session.normalize();
                tracing::warn!(session_id = %session.id, "settled a stale in-flight message");
                self.store.save_session(&session)?;
                self.session_updated(&session.id);
            }
            return Ok(session);
        }

        let personas = self.store.load_personas()?;
        let persona = self.active_persona(&personas, None)?;

        let mut session = ChatSession::new(character_id);
        session.active_persona_id = Some(persona.id.clone());
        if !character.greeting.trim().is_empty() {
            session
                .messages
                .push(Message::model(render_greeting(&character, &persona)));
        }

        self.store.save_session(&session)?;
        self.session_updated(&session.id);
        tracing::info!(session_id = %session.id, character_id, "session created");
        Ok(session)
    }

    /// Append a user turn and stream the character's reply into the session.
    ///
    /// Returns once the stream settles. On a mid-stream failure the partial
    /// reply is preserved as a version and the error is surfaced; on
    /// cancellation the partial is preserved and the call succeeds.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let _guard = self.claim(session_id)?;

        let mut session = self.store.load_session(session_id)?;
        let character = self.store.find_character(&session.character_id)?;
        let personas = self.store.load_personas()?;
        let persona = self.active_persona(&personas, session.active_persona_id.as_deref())?;

        session.messages.push(Message::user(text, persona.id.clone()));
        let reply_index = session.messages.len();
        session.messages.push(Message::model_generating());
        session.touch();
        self.store.save_session(&session)?;
        self.session_updated(session_id);

        let request = GenerationRequest {
            system_instruction: build_system_prompt(&character, &persona),
            turns: normalize_history(&session.messages, &personas),
            options: GenerationOptions {
                temperature: self.config.chat_temperature,
                thinking_budget: self.config.thinking_budget_for(character.maturity_level),
                max_tokens: self.config.max_output_tokens,
            },
        };

        self.stream_reply(&mut session, reply_index, request).await
    }

    /// Generate a fresh version for an existing model reply, using only the
    /// transcript ahead of it as context. A reply with no user turn before it
    /// has nothing to regenerate from and the call is a no-op.
    pub async fn regenerate(&self, session_id: &str, message_id: &str) -> Result<()> {
        let _guard = self.claim(session_id)?;
        let mut session = self.store.load_session(session_id)?;
        self.regenerate_inner(&mut session, message_id).await
    }

    async fn regenerate_inner(&self, session: &mut ChatSession, message_id: &str) -> Result<()> {
        let index = session
            .message_index(message_id)
            .filter(|&i| session.messages[i].role == Role::Model)
            .ok_or_else(|| EngineError::MessageNotFound(message_id.to_string()))?;

        if session.messages[index].versions.len() >= self.config.max_versions {
            self.emit(EngineEvent::CapacityReached {
                session_id: session.id.clone(),
                message_id: message_id.to_string(),
            });
            return Err(EngineError::CapacityReached(self.config.max_versions));
        }

        let character = self.store.find_character(&session.character_id)?;
        let personas = self.store.load_personas()?;
        let persona = self.active_persona(&personas, session.active_persona_id.as_deref())?;

        let turns = normalize_history(&session.messages[..index], &personas);
        if turns.is_empty() {
            tracing::debug!(message_id, "no context ahead of reply, nothing to regenerate");
            return Ok(());
        }

        {
            let target = &mut session.messages[index];
            target.is_generating = true;
            target.text.clear();
        }
        self.store.save_session(session)?;
        self.session_updated(&session.id);

        let request = GenerationRequest {
            system_instruction: build_system_prompt(&character, &persona),
            turns,
            options: GenerationOptions {
                temperature: self.config.chat_temperature,
                thinking_budget: self.config.thinking_budget_for(character.maturity_level),
                max_tokens: self.config.max_output_tokens,
            },
        };

        self.stream_reply(session, index, request).await
    }

    /// Drive one streaming generation into `session.messages[index]`,
    /// publishing the growing partial to the store after every chunk.
    async fn stream_reply(
        &self,
        session: &mut ChatSession,
        index: usize,
        request: GenerationRequest,
    ) -> Result<()> {
        let session_id = session.id.clone();
        let abort_rx = self.aborts.register(&session_id);

        let store = &self.store;
        let events = &self.events;
        let outcome = run_stream(&*self.service, request, abort_rx, |accumulated| {
            session.messages[index].text = accumulated.to_string();
            session.touch();
            if let Err(e) = store.save_session(session) {
                tracing::warn!(session_id = %session.id, "failed to persist partial: {}", e);
            }
            let _ = events.send(EngineEvent::SessionUpdated {
                session_id: session.id.clone(),
            });
        })
        .await;

        let target = &mut session.messages[index];
        target.is_generating = false;
        if !outcome.text.is_empty() || target.versions.is_empty() {
            branching::append_version(target, outcome.text.clone());
        } else {
            // failed regeneration with no partial: restore the selected take
            target.text = target.versions[target.current_version_index].clone();
        }
        session.touch();
        self.store.save_session(session)?;
        self.session_updated(&session_id);
        self.aborts.unregister(&session_id);

        if let Some(message) = outcome.error {
            self.emit(EngineEvent::Toast {
                message: message.clone(),
            });
            return Err(EngineError::Generation(message));
        }
        if outcome.cancelled {
            tracing::info!(session_id = %session_id, chars = outcome.text.len(), "generation cancelled");
        }
        Ok(())
    }

    /// Step a model reply's version cursor. `Next` past the newest version
    /// generates another take in place, unless the cap is reached.
    pub async fn navigate(
        &self,
        session_id: &str,
        message_id: &str,
        direction: NavigateDirection,
    ) -> Result<NavigateOutcome> {
        let _guard = self.claim(session_id)?;
        let mut session = self.store.load_session(session_id)?;

        let index = session
            .message_index(message_id)
            .filter(|&i| session.messages[i].role == Role::Model)
            .ok_or_else(|| EngineError::MessageNotFound(message_id.to_string()))?;

        match branching::navigate(
            &mut session.messages[index],
            direction,
            self.config.max_versions,
        ) {
            Ok(NavigateOutcome::Moved) => {
                session.touch();
                self.store.save_session(&session)?;
                self.session_updated(session_id);
                Ok(NavigateOutcome::Moved)
            }
            Ok(NavigateOutcome::AtStart) => Ok(NavigateOutcome::AtStart),
            Ok(NavigateOutcome::NeedsRegeneration) => {
                self.regenerate_inner(&mut session, message_id).await?;
                Ok(NavigateOutcome::NeedsRegeneration)
            }
            Err(e) => {
                if matches!(e, EngineError::CapacityReached(_)) {
                    self.emit(EngineEvent::CapacityReached {
                        session_id: session_id.to_string(),
                        message_id: message_id.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Change the session's active persona for future turns, leaving every
    /// existing message and version cursor untouched. A single system
    /// annotation marks the shift in the transcript.
    pub fn switch_persona(&self, session_id: &str, persona_id: &str) -> Result<()> {
        let _guard = self.claim(session_id)?;
        let mut session = self.store.load_session(session_id)?;
        let personas = self.store.load_personas()?;
        let persona = personas
            .iter()
            .find(|p| p.id == persona_id)
            .ok_or_else(|| EngineError::PersonaNotFound(persona_id.to_string()))?;

        if session.active_persona_id.as_deref() == Some(persona_id) {
            return Ok(());
        }

        session.active_persona_id = Some(persona.id.clone());
        session.messages.push(Message::system(format!(
            "Persona shift: active persona is now {}.",
            persona.name
        )));
        session.touch();
        self.store.save_session(&session)?;
        self.session_updated(session_id);
        Ok(())
    }

    /// Drop the transcript and reseed the greeting. Character memory is not
    /// affected; it belongs to the character, not the session.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        let _guard = self.claim(session_id)?;
        let mut session = self.store.load_session(session_id)?;
        let character = self.store.find_character(&session.character_id)?;
        let personas = self.store.load_personas()?;
        let persona = self.active_persona(&personas, session.active_persona_id.as_deref())?;

        session.messages.clear();
        if !character.greeting.trim().is_empty() {
            session
                .messages
                .push(Message::model(render_greeting(&character, &persona)));
        }
        session.touch();
        self.store.save_session(&session)?;
        self.session_updated(session_id);
        Ok(())
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let _guard = self.claim(session_id)?;
        let removed = self.store.delete_session(session_id)?;
        if removed {
            self.session_updated(session_id);
        }
        Ok(removed)
    }

    /// Signal the in-flight generation for a session, if any. Publication
    /// stops immediately; the partial settles as a version.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.aborts.abort(session_id)
    }

    /// Summarize the selected messages and append the result to the
    /// character's permanent memory. Returns whether memory changed.
    pub async fn etch_memory(&self, session_id: &str, message_ids: &[String]) -> Result<bool> {
        let session = self.store.load_session(session_id)?;
        let mut character = self.store.find_character(&session.character_id)?;
        let personas = self.store.load_personas()?;

        let selected: Vec<&Message> = session
            .messages
            .iter()
            .filter(|m| message_ids.iter().any(|id| *id == m.id))
            .collect();

        match memory::etch(&*self.service, &self.config, &character, &selected, &personas).await? {
            Some(updated) => {
                character.memory = updated;
                self.store.save_character(&character)?;
                self.emit(EngineEvent::CharacterUpdated {
                    character_id: character.id.clone(),
                });
                self.emit(EngineEvent::Toast {
                    message: format!("Memory etched for {}.", character.name),
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrite the character's whole memory record into a denser form.
    /// Returns whether memory changed.
    pub async fn consolidate_memory(&self, character_id: &str) -> Result<bool> {
        let mut character = self.store.find_character(character_id)?;

        match memory::consolidate(&*self.service, &self.config, &character).await? {
            Some(rewritten) => {
                character.memory = rewritten;
                self.store.save_character(&character)?;
                self.emit(EngineEvent::CharacterUpdated {
                    character_id: character.id.clone(),
                });
                self.emit(EngineEvent::Toast {
                    message: format!("Memory consolidated for {}.", character.name),
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
