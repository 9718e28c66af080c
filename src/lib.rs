//! guildmerit scores GitHub organisation contributions over a rolling window
//! and plans Discord role changes and GitHub issue/review assignments from
//! those scores, applying them only when the run mode and write flags allow.
//!
//! This crate re-exports the workspace members:
//!
//! - [`core`]: domain types, scoring, role and assignment planning, policy, audit rendering
//! - [`db`]: sqlx-backed event store, scores, cursors, identity links, audit journal
//! - [`github`]: octocrab ingestion and assignment writes
//! - [`discord`]: reqwest client for guild member roles
//! - [`engine`]: the one-shot orchestration cycle

pub use guildmerit_core as core;
pub use guildmerit_db as db;
pub use guildmerit_discord as discord;
pub use guildmerit_engine as engine;
pub use guildmerit_github as github;
