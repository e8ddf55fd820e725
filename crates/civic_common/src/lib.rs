//! Civic Common - Shared types and guards for the civic311 services
//!
//! Everything here is pure and network-free: configuration loading,
//! the complaint taxonomy, input sanitizing, rate windows, and the
//! wire types the daemon and sidecar exchange with the outside world.

pub mod complaint;
pub mod config;
pub mod safety;
pub mod sanitize;
pub mod types;

pub use complaint::ComplaintType;
pub use config::Config;
pub use safety::rate_limit::RateLimiter;
pub use types::*;
