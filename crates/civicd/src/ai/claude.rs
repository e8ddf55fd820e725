//! Claude API client (Anthropic messages endpoint, vision capable).

use super::{clip, BackendError, BackendMessage, ChatBackend, ContentPart, MessageContent, TEMPERATURE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use civic_common::config::VisionBackendConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Request timeout for the vision backend. Image turns take longer than
/// plain text, so this is looser than the text backend's.
pub const TIMEOUT_SECS: u64 = 60;

pub struct ClaudeChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeChat {
    pub fn new(config: &VisionBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("building claude http client")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

/// Serialize neutral content into Anthropic content blocks: a bare
/// string, or `text` / base64 `image` source blocks.
fn to_wire_content(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => {
            let wire: Vec<Value> = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { media_type, data } => json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": data,
                        }
                    }),
                })
                .collect();
            json!(wire)
        }
    }
}

pub(crate) fn request_body(model: &str, messages: &[BackendMessage], max_tokens: u32) -> Value {
    let wire_messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": to_wire_content(&m.content)}))
        .collect();

    json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": TEMPERATURE,
        "messages": wire_messages,
    })
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
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks of the reply.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[async_trait]
impl ChatBackend for ClaudeChat {
    async fn send(
        &self,
        messages: &[BackendMessage],
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        let body = request_body(&self.model, messages, max_tokens);

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_request(e, TIMEOUT_SECS))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                detail: clip(&detail, 200),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let text = parsed.text();
        if text.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "claude_api"
    }
}
