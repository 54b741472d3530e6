//! Guruwalk Agent API
//!
//! Accepts natural-language browser automation tasks over HTTP, runs them in
//! the background against one shared headless browser and LLM client, and
//! reports their status by id.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod resources;
pub mod state;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use state::AppState;
