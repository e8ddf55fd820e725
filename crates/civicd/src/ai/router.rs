//! Smart routing between the two chat backends.
//!
//! Photo turns go to the vision backend only. Text turns go to the
//! text-first backend and fall back to the vision backend on any
//! failure. Every backend call is rate gated and retried with capped
//! exponential backoff, and the router never surfaces an error to the
//! conversation: total failure becomes a canned apology.

use super::claude::ClaudeChat;
use super::heroku::HerokuInference;
use super::{BackendError, BackendMessage, ChatBackend};
use anyhow::Result;
use civic_common::config::Config;
use civic_common::safety::rate_limit::{
    RateLimiter, TEXT_BACKEND_KEY, TEXT_BACKEND_LIMIT, VISION_BACKEND_KEY, VISION_BACKEND_LIMIT,
};
use civic_common::types::{CallStatsSnapshot, ProbeStatus, Role};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Reply used when every backend in the chain has failed.
pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble processing your request \
right now. Please try again in a moment, or call 311 directly at 416-392-2219. Thanks for \
your patience! 🙏";

const PROBE_PROMPT: &str = "Say ok";
const PROBE_MAX_TOKENS: u32 = 10;

/// Retry schedule for one backend call series.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based failed attempt: base doubled
    /// per attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// A policy that never sleeps, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Relaxed call counters. Snapshots may tear across counters; the
/// analytics consumer tolerates that.
#[derive(Debug, Default)]
pub struct CallStats {
    text_calls: AtomicU64,
    vision_calls: AtomicU64,
    text_errors: AtomicU64,
    vision_errors: AtomicU64,
    photo_routes: AtomicU64,
    text_routes: AtomicU64,
}

impl CallStats {
    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            text_calls: self.text_calls.load(Ordering::Relaxed),
            vision_calls: self.vision_calls.load(Ordering::Relaxed),
            text_errors: self.text_errors.load(Ordering::Relaxed),
            vision_errors: self.vision_errors.load(Ordering::Relaxed),
            photo_routes: self.photo_routes.load(Ordering::Relaxed),
            text_routes: self.text_routes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Text,
    Vision,
}

impl BackendKind {
    fn quota(self) -> (&'static str, u32) {
        match self {
            BackendKind::Text => (TEXT_BACKEND_KEY, TEXT_BACKEND_LIMIT),
            BackendKind::Vision => (VISION_BACKEND_KEY, VISION_BACKEND_LIMIT),
        }
    }
}

/// Health probe results for the two chat backends.
#[derive(Debug, Clone, Copy)]
pub struct AiProbe {
    pub text: ProbeStatus,
    pub vision: ProbeStatus,
}

impl AiProbe {
    /// True when at least one backend answered the probe.
    pub fn any_ok(&self) -> bool {
        self.text == ProbeStatus::Ok || self.vision == ProbeStatus::Ok
    }
}

pub struct AiRouter {
    text: Option<Arc<dyn ChatBackend>>,
    vision: Option<Arc<dyn ChatBackend>>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    stats: CallStats,
}

impl AiRouter {
    pub fn new(
        text: Option<Arc<dyn ChatBackend>>,
        vision: Option<Arc<dyn ChatBackend>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            text,
            vision,
            limiter,
            retry: RetryPolicy::default(),
            stats: CallStats::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the router from configuration, constructing real clients
    /// for whichever backends are provisioned.
    pub fn from_config(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let text = match &config.text_backend {
            Some(cfg) => {
                info!("[BOOT] text backend ready (model {})", cfg.model);
                Some(Arc::new(HerokuInference::new(cfg)?) as Arc<dyn ChatBackend>)
            }
            None => {
                warn!("[BOOT] text backend not configured");
                None
            }
        };

        let vision = match &config.vision_backend {
            Some(cfg) => {
                info!("[BOOT] vision backend ready (model {})", cfg.model);
                Some(Arc::new(ClaudeChat::new(cfg)?) as Arc<dyn ChatBackend>)
            }
            None => {
                warn!("[BOOT] vision backend not configured");
                None
            }
        };

        if text.is_none() && vision.is_none() {
            error!("[BOOT] no chat backends configured");
        }

        Ok(Self::new(text, vision, limiter))
    }

    pub fn stats(&self) -> CallStatsSnapshot {
        self.stats.snapshot()
    }

    /// Route a conversation turn and always produce a reply.
    pub async fn create_message(
        &self,
        messages: &[BackendMessage],
        has_photo: bool,
        max_tokens: u32,
    ) -> String {
        if has_photo {
            info!("routing: photo turn -> vision backend");
            self.stats.photo_routes.fetch_add(1, Ordering::Relaxed);
            match self.call_backend(BackendKind::Vision, messages, max_tokens).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!("vision backend failed on photo turn: {err}");
                    self.stats.vision_errors.fetch_add(1, Ordering::Relaxed);
                    FALLBACK_REPLY.to_string()
                }
            }
        } else {
            info!("routing: text turn -> text backend");
            self.stats.text_routes.fetch_add(1, Ordering::Relaxed);
            match self.call_backend(BackendKind::Text, messages, max_tokens).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!("text backend failed, falling back to vision backend: {err}");
                    self.stats.text_errors.fetch_add(1, Ordering::Relaxed);
                    match self.call_backend(BackendKind::Vision, messages, max_tokens).await {
                        Ok(reply) => reply,
                        Err(err) => {
                            error!("vision fallback also failed: {err}");
                            self.stats.vision_errors.fetch_add(1, Ordering::Relaxed);
                            FALLBACK_REPLY.to_string()
                        }
                    }
                }
            }
        }
    }

    /// One rate-gated, retried call series against a single backend.
    async fn call_backend(
        &self,
        kind: BackendKind,
        messages: &[BackendMessage],
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        let backend = match kind {
            BackendKind::Text => self.text.as_ref(),
            BackendKind::Vision => self.vision.as_ref(),
        }
        .ok_or(BackendError::NotConfigured)?;

        let (key, ceiling) = kind.quota();
        let mut attempt = 0;
        loop {
            if !self.limiter.try_consume(key, ceiling) {
                warn!("rate window exhausted for {key}");
                return Err(BackendError::RateLimited(key));
            }
            match kind {
                BackendKind::Text => self.stats.text_calls.fetch_add(1, Ordering::Relaxed),
                BackendKind::Vision => self.stats.vision_calls.fetch_add(1, Ordering::Relaxed),
            };

            match backend.send(messages, max_tokens).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "attempt {} against {} failed ({err}), retrying in {:?}",
                        attempt + 1,
                        backend.name(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Probe each configured backend with a tiny completion.
    pub async fn health_probe(&self) -> AiProbe {
        AiProbe {
            text: self.probe_one(BackendKind::Text).await,
            vision: self.probe_one(BackendKind::Vision).await,
        }
    }

    async fn probe_one(&self, kind: BackendKind) -> ProbeStatus {
        let configured = match kind {
            BackendKind::Text => self.text.is_some(),
            BackendKind::Vision => self.vision.is_some(),
        };
        if !configured {
            return ProbeStatus::NotConfigured;
        }

        let probe = [BackendMessage::text(Role::User, PROBE_PROMPT)];
        match self.call_backend(kind, &probe, PROBE_MAX_TOKENS).await {
            Ok(reply) if !reply.is_empty() => ProbeStatus::Ok,
            Ok(_) => ProbeStatus::Error,
            Err(err) => {
                warn!("health probe failed for {key}: {err}", key = kind.quota().0);
                ProbeStatus::Error
            }
        }
    }
}
