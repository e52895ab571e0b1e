//! Lyri Core - stem separation, lyrics alignment and subtitle video
//! production.
//!
//! This crate contains all task and pipeline logic with no transport
//! layer. It can be driven by a CLI or embedded in a service.

pub mod artifacts;
pub mod cancel;
pub mod config;
pub mod executor;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod stages;
pub mod subtitles;
pub mod tasks;
pub mod tools;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
