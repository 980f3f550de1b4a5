//! The generation-service seam.
//!
//! The engine treats the model behind it as an opaque, possibly-streaming
//! text function: given a system instruction and an ordered turn list,
//! produce text. `http` ships one concrete client; tests script their own.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::context::Turn;
use crate::error::Result;

pub mod http;
pub mod sse;

#[derive(Serialize, Clone, Copy, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub temperature: f64,
    /// Optional reasoning-token budget; omitted from the request when `None`.
    pub thinking_budget: Option<u32>,
    /// Optional completion-length cap; omitted from the request when `None`.
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.95,
            thinking_budget: None,
            max_tokens: None,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub turns: Vec<Turn>,
    pub options: GenerationOptions,
}

/// Incremental text chunks terminating in end-of-stream or a single error.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// One-shot completion. Used for memory etch/consolidate.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    /// Streaming completion. The caller accumulates chunks; the stream owns
    /// no session state.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream>;
}
