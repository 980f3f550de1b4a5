//! Record persistence over an injected key→value store.
//!
//! The backend contract is deliberately thin: durable `get`/`set` with
//! last-write-wins per key, nothing more. Character, persona, and session
//! lists are stored as whole JSON documents under fixed keys matching the
//! app's existing records. Loads are verbatim: a session with a stream in
//! flight reads back exactly as last written, so observers polling through
//! the store see the live `is_generating` state. Invariant repair of stale
//! records happens when the engine adopts a session, not here.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::types::{Character, ChatSession, Persona};
use crate::utils::now_millis;

pub const CHARACTERS_KEY: &str = "pf_characters";
pub const PERSONAS_KEY: &str = "pf_personas";
pub const SESSIONS_KEY: &str = "pf_chats";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// In-memory backend for tests and ephemeral embedding.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| EngineError::Store("store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| EngineError::Store("store lock poisoned".into()))?;
        map.insert(key.to_string(), value);
        Ok(())
    }
}

/// Typed access to the stored record lists.
pub struct SessionStore {
    backend: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    fn load_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.backend.get(key)? {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| EngineError::Store(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn save_list<T: serde::Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let value = serde_json::to_value(items).map_err(|e| EngineError::Store(e.to_string()))?;
        self.backend.set(key, value)
    }

    pub fn load_characters(&self) -> Result<Vec<Character>> {
        self.load_list(CHARACTERS_KEY)
    }

    pub fn save_characters(&self, characters: &[Character]) -> Result<()> {
        self.save_list(CHARACTERS_KEY, characters)
    }

    pub fn find_character(&self, character_id: &str) -> Result<Character> {
        self.load_characters()?
            .into_iter()
            .find(|c| c.id == character_id)
            .ok_or_else(|| EngineError::CharacterNotFound(character_id.to_string()))
    }

    /// Upsert one character record, bumping its `updated_at`.
    pub fn save_character(&self, character: &Character) -> Result<()> {
        let mut characters = self.load_characters()?;
        let mut updated = character.clone();
        updated.updated_at = now_millis();
        match characters.iter_mut().find(|c| c.id == character.id) {
            Some(slot) => *slot = updated,
            None => characters.push(updated),
        }
        self.save_characters(&characters)
    }

    /// Load personas, seeding the default one on an empty store so there is
    /// always a sender identity to resolve to.
    pub fn load_personas(&self) -> Result<Vec<Persona>> {
        let mut personas: Vec<Persona> = self.load_list(PERSONAS_KEY)?;
        if personas.is_empty() {
            personas.push(Persona::fallback_default());
            self.save_list(PERSONAS_KEY, &personas)?;
        }
        Ok(personas)
    }

    pub fn save_personas(&self, personas: &[Persona]) -> Result<()> {
        self.save_list(PERSONAS_KEY, personas)
    }

    pub fn load_sessions(&self) -> Result<Vec<ChatSession>> {
        self.load_list(SESSIONS_KEY)
    }

    pub fn load_session(&self, session_id: &str) -> Result<ChatSession> {
        self.load_sessions()?
            .into_iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// The most recently active session bound to a character, if any.
    pub fn find_session_for_character(&self, character_id: &str) -> Result<Option<ChatSession>> {
        Ok(self
            .load_sessions()?
            .into_iter()
            .filter(|s| s.character_id == character_id)
            .max_by_key(|s| s.last_active))
    }

    pub fn save_session(&self, session: &ChatSession) -> Result<()> {
        let mut sessions = self.load_sessions()?;
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(slot) => *slot = session.clone(),
            None => sessions.push(session.clone()),
        }
        self.save_list(SESSIONS_KEY, &sessions)
    }

    /// Remove a session entirely. Never touches the character record.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.load_sessions()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        let removed = sessions.len() != before;
        if removed {
            self.save_list(SESSIONS_KEY, &sessions)?;
        }
        Ok(removed)
    }
}
