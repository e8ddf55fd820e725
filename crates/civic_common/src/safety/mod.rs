//! Safety guards shared by every service in the workspace.

pub mod rate_limit;

pub use rate_limit::RateLimiter;
