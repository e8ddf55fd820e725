//! Chat backend abstraction.
//!
//! The router speaks one neutral message shape; each backend client
//! serializes it to its own wire format. Real implementations live in
//! [`heroku`] and [`claude`]; [`FakeBackend`] drives the orchestration
//! tests without any network.

pub mod claude;
pub mod heroku;
pub mod router;

use async_trait::async_trait;
use civic_common::types::Role;
use std::collections::VecDeque;
use std::sync::Mutex;

pub use router::{AiRouter, CallStats, RetryPolicy, FALLBACK_REPLY};

/// Sampling temperature used for every chat call.
pub const TEMPERATURE: f32 = 0.5;

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    Image { media_type: String, data: String },
}

/// Message content: plain text or multimodal parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn has_image(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::Image { .. })),
        }
    }

    /// The text fragments of this content, in order.
    pub fn text_fragments(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect(),
        }
    }
}

/// A single turn as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl BackendMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying text plus one attached image.
    pub fn with_image(
        role: Role,
        text: impl Into<String>,
        media_type: impl Into<String>,
        base64_data: impl Into<String>,
    ) -> Self {
        Self {
            role,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::Image {
                    media_type: media_type.into(),
                    data: base64_data.into(),
                },
            ]),
        }
    }
}

/// Chat backend errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend not configured")]
    NotConfigured,

    #[error("rate limit exhausted for {0}")]
    RateLimited(&'static str),

    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("backend returned empty response")]
    EmptyResponse,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether a retry could plausibly succeed. Connection trouble,
    /// timeouts, server errors, and upstream throttling are worth
    /// retrying; everything else fails the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) | BackendError::Timeout(_) => true,
            BackendError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Map a reqwest send failure onto the taxonomy.
    pub fn from_request(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout_secs)
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Clip upstream error bodies before they hit the logs.
pub(crate) fn clip(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// A chat model endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a conversation and return the assistant's reply text.
    async fn send(
        &self,
        messages: &[BackendMessage],
        max_tokens: u32,
    ) -> Result<String, BackendError>;

    fn name(&self) -> &'static str;
}

/// Scripted backend for tests: returns queued results in order, then
/// the fallback result forever. Records every call.
pub struct FakeBackend {
    name: &'static str,
    queue: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: Result<String, BackendError>,
    calls: Mutex<usize>,
    last_max_tokens: Mutex<Option<u32>>,
    last_messages: Mutex<Option<Vec<BackendMessage>>>,
}

impl FakeBackend {
    pub fn with_reply(name: &'static str, reply: impl Into<String>) -> Self {
        Self {
            name,
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok(reply.into()),
            calls: Mutex::new(0),
            last_max_tokens: Mutex::new(None),
            last_messages: Mutex::new(None),
        }
    }

    pub fn with_error(name: &'static str, error: BackendError) -> Self {
        Self {
            name,
            queue: Mutex::new(VecDeque::new()),
            fallback: Err(error),
            calls: Mutex::new(0),
            last_max_tokens: Mutex::new(None),
            last_messages: Mutex::new(None),
        }
    }

    /// Queue a result to be returned before the fallback kicks in.
    pub fn queue_result(self, result: Result<String, BackendError>) -> Self {
        self.queue
            .lock()
            .expect("fake queue lock")
            .push_back(result);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("fake call lock")
    }

    pub fn last_max_tokens(&self) -> Option<u32> {
        *self.last_max_tokens.lock().expect("fake tokens lock")
    }

    pub fn last_messages(&self) -> Option<Vec<BackendMessage>> {
        self.last_messages.lock().expect("fake messages lock").clone()
    }

    /// Whether the most recent call carried an image part.
    pub fn last_call_had_image(&self) -> bool {
        self.last_messages()
            .map(|msgs| msgs.iter().any(|m| m.content.has_image()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn send(
        &self,
        messages: &[BackendMessage],
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        *self.calls.lock().expect("fake call lock") += 1;
        *self.last_max_tokens.lock().expect("fake tokens lock") = Some(max_tokens);
        *self.last_messages.lock().expect("fake messages lock") = Some(messages.to_vec());

        let queued = self.queue.lock().expect("fake queue lock").pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
