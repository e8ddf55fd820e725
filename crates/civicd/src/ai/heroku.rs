//! Heroku Managed Inference client (OpenAI-compatible chat completions).

use super::{clip, BackendError, BackendMessage, ChatBackend, ContentPart, MessageContent, TEMPERATURE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use civic_common::config::TextBackendConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Request timeout for the text backend.
pub const TIMEOUT_SECS: u64 = 30;

/// OpenAI-compatible chat client for the managed inference endpoint.
pub struct HerokuInference {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HerokuInference {
    pub fn new(config: &TextBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("building inference http client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

/// Serialize neutral content into chat-completions content: a bare
/// string, or an array of `text` / `image_url` parts with a data URI.
fn to_wire_content(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => {
            let wire: Vec<Value> = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { media_type, data } => json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:{media_type};base64,{data}")}
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
        "messages": wire_messages,
        "max_tokens": max_tokens,
        "temperature": TEMPERATURE,
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for HerokuInference {
    async fn send(
        &self,
        messages: &[BackendMessage],
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        let body = request_body(&self.model, messages, max_tokens);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(BackendError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "heroku_inference"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_common::types::Role;

    #[test]
    fn test_request_body_plain_text() {
        let messages = [
            BackendMessage::text(Role::User, "hello"),
            BackendMessage::text(Role::Assistant, "hi there"),
        ];
        let body = request_body("claude-4-5-sonnet", &messages, 256);

        assert_eq!(body["model"], "claude-4-5-sonnet");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[test]
    fn test_request_body_image_becomes_data_uri() {
        let messages = [BackendMessage::with_image(
            Role::User,
            "see photo",
            "image/png",
            "aWM=",
        )];
        let body = request_body("claude-4-5-sonnet", &messages, 64);

        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "see photo");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,aWM="
        );
    }

    #[test]
    fn test_completion_parsing() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#;
        let completion: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(
            completion.choices[0].message.content.as_deref(),
            Some("ok")
        );

        let raw = r#"{"choices": []}"#;
        let completion: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert!(completion.choices.is_empty());
    }
}
