//! Buffered SSE decoding for streaming completions.

use serde_json::Value;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(String),
}

/// Buffered SSE decoder that can handle JSON fragments split across chunk
/// boundaries.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw text chunk, returning any complete events parsed from it.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut events: Vec<StreamEvent> = Vec::new();

        let mut last_newline = 0usize;
        for (idx, ch) in self.buffer.char_indices() {
            if ch != '\n' {
                continue;
            }
            let line = &self.buffer[last_newline..idx];
            last_newline = idx + 1;

            let l = line.trim();
            let Some(rest) = l.strip_prefix("data:") else {
                continue;
            };
            let payload = rest.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                events.push(StreamEvent::Done);
                continue;
            }
            if let Ok(v) = serde_json::from_str::<Value>(payload) {
                if let Some(err) = extract_error_message(&v) {
                    events.push(StreamEvent::Error(err));
                    continue;
                }
                if let Some(piece) = extract_text(&v) {
                    if !piece.is_empty() {
                        events.push(StreamEvent::Delta(piece));
                    }
                }
            }
        }
        if last_newline > 0 {
            self.buffer.drain(..last_newline);
        }
        events
    }
}

/// Pull completion text out of a response payload, streaming delta first,
/// then non-streaming message shapes, then loose fallbacks.
pub fn extract_text(v: &Value) -> Option<String> {
    if let Some(s) = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
    {
        return Some(s.to_string());
    }
    if let Some(s) = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
    {
        return Some(s.to_string());
    }
    if let Some(s) = v.get("content").and_then(|t| t.as_str()) {
        return Some(s.to_string());
    }
    if let Some(s) = v.get("text").and_then(|t| t.as_str()) {
        return Some(s.to_string());
    }
    None
}

/// A human-readable error from a provider payload, if it carries one.
pub fn extract_error_message(v: &Value) -> Option<String> {
    let err = v.get("error")?;
    if let Some(s) = err.as_str() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(s) = err.get("message").and_then(|m| m.as_str()) {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_delta_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
             data: [DONE]\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hel".into()),
                StreamEvent::Delta("lo".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn reassembles_payload_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let first = decoder.feed("data: {\"choices\":[{\"delta\":{\"co");
        assert!(first.is_empty());
        let second = decoder.feed("ntent\":\"whole\"}}]}\n");
        assert_eq!(second, vec![StreamEvent::Delta("whole".into())]);
    }

    #[test]
    fn surfaces_inline_provider_errors() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: {\"error\":{\"message\":\"rate limited\"}}\n");
        assert_eq!(events, vec![StreamEvent::Error("rate limited".into())]);
    }

    #[test]
    fn extracts_text_from_non_streaming_response() {
        let v: Value = serde_json::from_str(
            "{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"hi there\"}}]}",
        )
        .unwrap();
        assert_eq!(extract_text(&v).as_deref(), Some("hi there"));
    }

    #[test]
    fn ignores_comment_and_blank_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(": keep-alive\n\ndata:\n");
        assert!(events.is_empty());
    }
}
