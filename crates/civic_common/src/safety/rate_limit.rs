//! Fixed-window rate limiter for backend quotas and per-client throttling.
//!
//! One instance is shared by the whole process; callers pass their own
//! key and ceiling. A fixed window is deliberate: upstream quotas are
//! stated per minute, and a counter that resets on a minute boundary is
//! what residents and operators can reason about.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Window key for the text-first chat backend.
pub const TEXT_BACKEND_KEY: &str = "text_backend";
/// Window key for the vision-capable chat backend.
pub const VISION_BACKEND_KEY: &str = "vision_backend";
/// Window key for the case desk.
pub const SALESFORCE_KEY: &str = "salesforce";

/// Calls per window allowed against the text backend.
pub const TEXT_BACKEND_LIMIT: u32 = 150;
/// Calls per window allowed against the vision backend.
pub const VISION_BACKEND_LIMIT: u32 = 50;
/// Calls per window allowed against the case desk.
pub const SALESFORCE_LIMIT: u32 = 100;
/// Requests per window allowed from a single client.
pub const CLIENT_LIMIT: u32 = 10;

/// The standard window length.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Window key for a resident client.
pub fn client_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

/// Fixed-window rate limiter keyed by service or client.
#[derive(Debug)]
pub struct RateLimiter {
    /// Window state per key
    windows: Arc<Mutex<HashMap<String, Window>>>,
    /// Window duration (injectable so tests do not sleep for a minute)
    window: Duration,
}

/// Counter state for a single key
#[derive(Debug, Clone)]
struct Window {
    count: u32,
    started: Instant,
}

impl RateLimiter {
    /// Create a limiter with a custom window length.
    pub fn new(window: Duration) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Create a limiter with the standard 60 second window.
    pub fn standard() -> Self {
        Self::new(WINDOW)
    }

    /// Consume one unit from `key`'s window, up to `ceiling` per window.
    ///
    /// A lapsed window resets first. A rejected call mutates nothing:
    /// neither the count nor the window start moves, so hammering a full
    /// window never extends it.
    pub fn try_consume(&self, key: &str, ceiling: u32) -> bool {
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= ceiling {
            return false;
        }
        window.count += 1;
        true
    }

    /// Units already consumed in `key`'s current window.
    pub fn consumed(&self, key: &str) -> u32 {
        let windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match windows.get(key) {
            Some(w) if w.started.elapsed() < self.window => w.count,
            _ => 0,
        }
    }

    /// Drop windows that lapsed more than `max_age` ago.
    ///
    /// Per-client keys are unbounded, so the daemon runs this on a timer.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        windows.retain(|_, w| now.duration_since(w.started) < self.window + max_age);
    }

    /// Number of live windows (for monitoring).
    pub fn window_count(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Tests
// ============================================================================
