//! Moonai: a character-roleplay conversation session engine.
//!
//! Characters, user personas, and branching transcripts live in an injected
//! key-value store; replies stream in from any [`GenerationService`], with
//! an OpenAI-compatible HTTP client included. The engine handles prompt
//! assembly, history normalization, per-message version branching, and the
//! character's persistent narrative memory.

pub mod abort;
pub mod branching;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod persona;
pub mod prompt;
pub mod provider;
pub mod store;
pub mod streaming;
pub mod types;
pub mod utils;

pub use branching::{NavigateDirection, NavigateOutcome};
pub use config::EngineConfig;
pub use engine::{ChatEngine, EngineEvent};
pub use error::{EngineError, Result};
pub use provider::http::HttpGenerationClient;
pub use provider::{GenerationOptions, GenerationRequest, GenerationService, TextStream};
pub use store::{KeyValueStore, MemoryStore, SessionStore};
pub use types::{Character, ChatSession, Maturity, Message, Persona, Role};
