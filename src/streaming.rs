//! Drives a token stream into an accumulating draft.
//!
//! Each chunk appends to the accumulator and the full accumulated text is
//! republished, so observers always see a consistent prefix of the final
//! reply. A fired abort receiver stops publication immediately; whatever
//! accumulated up to that point is the outcome.

use futures_util::StreamExt;
use tokio::sync::oneshot;

use crate::provider::{GenerationRequest, GenerationService};

/// Terminal state of one streamed generation.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    /// Accumulated reply text, possibly partial on error or cancel.
    pub text: String,
    pub error: Option<String>,
    pub cancelled: bool,
}

/// Run a streaming generation to completion, cancellation, or failure.
///
/// `publish` is called with the full accumulated text after every chunk.
/// Once the abort receiver fires, `publish` is never called again.
pub async fn run_stream<F>(
    service: &dyn GenerationService,
    request: GenerationRequest,
    mut abort_rx: oneshot::Receiver<()>,
    mut publish: F,
) -> StreamOutcome
where
    F: FnMut(&str),
{
    let mut outcome = StreamOutcome::default();

    let mut stream = match service.generate_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    loop {
        tokio::select! {
            _ = &mut abort_rx => {
                tracing::debug!(chars = outcome.text.len(), "stream aborted");
                outcome.cancelled = true;
                return outcome;
            }
            chunk = stream.next() => match chunk {
                Some(Ok(piece)) => {
                    outcome.text.push_str(&piece);
                    publish(&outcome.text);
                }
                Some(Err(e)) => {
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
                None => return outcome,
            },
        }
    }
}
