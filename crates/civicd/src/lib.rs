//! Civic daemon library - exposes modules for testing.

pub mod ai;
pub mod cases;
pub mod chat;
pub mod extract;
pub mod location;
pub mod prompts;
pub mod routes;
pub mod salesforce;
pub mod server;
