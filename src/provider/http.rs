//! OpenAI-compatible chat-completions client with SSE streaming.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use super::sse::{extract_error_message, extract_text, SseDecoder, StreamEvent};
use super::{GenerationRequest, GenerationService, TextStream};
use crate::context::TurnRole;
use crate::error::{EngineError, Result};

const REQUEST_TIMEOUT_MS: u64 = 120_000;

pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    extra_headers: HashMap<String, String>,
}

impl HttpGenerationClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|e| EngineError::Generation(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            extra_headers: HashMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    fn endpoint(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.ends_with("/v1") {
            format!("{}/chat/completions", trimmed)
        } else {
            format!("{}/v1/chat/completions", trimmed)
        }
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if !request.system_instruction.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_instruction }));
        }
        for turn in &request.turns {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.text }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "temperature": request.options.temperature,
            "top_p": 1.0,
        });
        if let Some(max_tokens) = request.options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(budget) = request.options.thinking_budget {
            body["reasoning"] = json!({ "max_tokens": budget });
        }
        body
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let endpoint = self.endpoint();
        tracing::debug!(endpoint = %endpoint, stream, turns = request.turns.len(), "sending generation request");

        let mut builder = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", if stream { "text/event-stream" } else { "application/json" });
        for (key, value) in &self.extra_headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .json(&self.body(request, stream))
            .send()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let fallback = format!("Provider returned status {}", status.as_u16());
            let payload = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&payload)
                .ok()
                .as_ref()
                .and_then(extract_error_message)
                .map(|m| format!("{} (status {})", m, status.as_u16()))
                .unwrap_or(fallback);
            tracing::warn!(status = status.as_u16(), "provider error: {}", message);
            return Err(EngineError::Generation(message));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let response = self.send(&request, false).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        if let Some(message) = extract_error_message(&data) {
            return Err(EngineError::Generation(message));
        }
        extract_text(&data)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EngineError::Generation("Empty response from provider".into()))
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream> {
        let response = self.send(&request, true).await?;

        struct State {
            inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
            decoder: SseDecoder,
            pending: VecDeque<String>,
            done: bool,
        }

        let state = State {
            inner: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures_util::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(text) = st.pending.pop_front() {
                    return Some((Ok(text), st));
                }
                if st.done {
                    return None;
                }
                match st.inner.next().await {
                    Some(Ok(bytes)) => {
                        let chunk = String::from_utf8_lossy(&bytes).into_owned();
                        for event in st.decoder.feed(&chunk) {
                            match event {
                                StreamEvent::Delta(text) => st.pending.push_back(text),
                                StreamEvent::Done => st.done = true,
                                StreamEvent::Error(message) => {
                                    st.done = true;
                                    return Some((Err(EngineError::Generation(message)), st));
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(EngineError::Generation(e.to_string())), st));
                    }
                    None => st.done = true,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Turn;
    use crate::provider::GenerationOptions;

    fn make_client() -> HttpGenerationClient {
        HttpGenerationClient::new("https://api.example.com", "sk-test", "test-model")
            .expect("client")
    }

    #[test]
    fn endpoint_appends_v1_once() {
        let plain = make_client();
        assert_eq!(
            plain.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );

        let versioned =
            HttpGenerationClient::new("https://api.example.com/v1/", "sk-test", "m").unwrap();
        assert_eq!(
            versioned.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn body_maps_roles_and_omits_absent_budget() {
        let client = make_client();
        let request = GenerationRequest {
            system_instruction: "be brief".into(),
            turns: vec![
                Turn { role: TurnRole::User, text: "[Me]: hi".into() },
                Turn { role: TurnRole::Model, text: "hello".into() },
            ],
            options: GenerationOptions { temperature: 0.5, ..GenerationOptions::default() },
        };

        let body = client.body(&request, true);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(body["stream"], true);
        assert!(body.get("reasoning").is_none());
        // no completion cap unless configured, the provider's limit rules
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn body_carries_completion_cap_when_configured() {
        let client = make_client();
        let request = GenerationRequest {
            system_instruction: String::new(),
            turns: vec![Turn { role: TurnRole::User, text: "hi".into() }],
            options: GenerationOptions {
                max_tokens: Some(2048),
                ..GenerationOptions::default()
            },
        };

        let body = client.body(&request, false);
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn body_carries_thinking_budget_when_set() {
        let client = make_client();
        let request = GenerationRequest {
            system_instruction: String::new(),
            turns: vec![Turn { role: TurnRole::User, text: "hi".into() }],
            options: GenerationOptions { thinking_budget: Some(512), ..GenerationOptions::default() },
        };

        let body = client.body(&request, false);
        assert_eq!(body["reasoning"]["max_tokens"], 512);
        // no system entry when the instruction is empty
        assert_eq!(body["messages"].as_array().unwrap()[0]["role"], "user");
    }
}
