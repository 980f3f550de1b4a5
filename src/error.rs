use thiserror::Error;

/// Engine-level failures surfaced to callers.
///
/// Passive persona resolution misses and un-normalizable histories are
/// deliberately not represented here: the former falls back deterministically
/// and the latter means "nothing to send yet", neither is an error. An
/// explicit switch to an unknown persona id is one.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network or service-side failure during a generation call. Never
    /// retried automatically; any partial output is preserved by the caller.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A regeneration was requested for a message already at the version cap.
    #[error("version limit reached ({0} alternatives)")]
    CapacityReached(usize),

    /// Another generation is already in flight for this session. Requests
    /// are rejected, not queued.
    #[error("a response is already being generated for this session")]
    Busy,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("character not found: {0}")]
    CharacterNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    #[error("storage failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
