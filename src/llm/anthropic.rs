//! Anthropic Messages API client
//!
//! Uses a single reqwest::Client with the request timeout from configuration.
//! No retries: one call per query.

use crate::config::LlmConfig;
use crate::error::{ModelError, ModelErrorKind};
use crate::llm::{Message, ModelClient, Role};
use crate::router::prompt::PREFILL;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    url: String,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> crate::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            url: MESSAGES_URL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        let request = build_request(&self.model, self.max_tokens, messages)?;
        let used_prefill = ends_with_prefill(messages);

        info!(model = %self.model, turns = request.messages.len(), "Calling Anthropic API");

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timeout = e.is_timeout(), "Anthropic request failed");
                ModelError::unavailable("LLM unavailable.")
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Anthropic API error response");
            return Err(error_for_status(status));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse Anthropic response");
            ModelError::unavailable("LLM unavailable.")
        })?;

        let text = extract_text(&parsed);
        debug!(chars = text.len(), prefill = used_prefill, "Anthropic response received");

        Ok(if used_prefill {
            format!("{}{}", PREFILL, text)
        } else {
            text
        })
    }
}

/// Split system turns into the top-level `system` field; the rest stay ordered.
fn build_request<'a>(
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
) -> Result<MessagesRequest<'a>, ModelError> {
    let system_parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let turns: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();
    if turns.is_empty() {
        return Err(ModelError::unavailable("At least one user message is required."));
    }

    Ok(MessagesRequest {
        model,
        max_tokens,
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        },
        messages: turns,
    })
}

fn ends_with_prefill(messages: &[Message]) -> bool {
    messages
        .last()
        .map(|m| m.role == Role::Assistant && m.content == PREFILL)
        .unwrap_or(false)
}

fn error_for_status(status: StatusCode) -> ModelError {
    match status.as_u16() {
        401 | 403 => ModelError::new(ModelErrorKind::Auth, "LLM authentication failed."),
        429 => ModelError::new(ModelErrorKind::RateLimited, "LLM rate limited."),
        _ => ModelError::unavailable("LLM unavailable."),
    }
}

fn extract_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect()
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<&'a Message>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            Message::system("first"),
            Message::system("second"),
            Message::user("What is the total return of AAPL?"),
            Message::assistant("{"),
        ];
        let request = build_request("claude-haiku-4-5", 256, &messages).unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "claude-haiku-4-5",
                "max_tokens": 256,
                "system": "first\n\nsecond",
                "messages": [
                    {"role": "user", "content": "What is the total return of AAPL?"},
                    {"role": "assistant", "content": "{"}
                ]
            })
        );
    }

    #[test]
    fn test_request_without_system_omits_field() {
        let messages = vec![Message::user("hi")];
        let value = serde_json::to_value(build_request("m", 1, &messages).unwrap()).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_request_requires_a_turn() {
        let err = build_request("m", 1, &[Message::system("only system")]).unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Unavailable);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(error_for_status(StatusCode::UNAUTHORIZED).kind, ModelErrorKind::Auth);
        assert_eq!(error_for_status(StatusCode::FORBIDDEN).kind, ModelErrorKind::Auth);
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS).kind,
            ModelErrorKind::RateLimited
        );
        for code in [400u16, 404, 500, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(error_for_status(status).kind, ModelErrorKind::Unavailable);
        }
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "\"type\":\"refusal\","},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "\"refusal\":{\"reason\":\"no\"}}"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();

        assert_eq!(
            extract_text(&response),
            "\"type\":\"refusal\",\"refusal\":{\"reason\":\"no\"}}"
        );
    }

    #[test]
    fn test_prefill_detection() {
        assert!(ends_with_prefill(&[Message::user("q"), Message::assistant("{")]));
        assert!(!ends_with_prefill(&[Message::user("q")]));
        assert!(!ends_with_prefill(&[]));
    }
}
