//! release-wizard - Human-gated release pipeline state machine
//!
//! Drives a multi-step release (collect commits, wait for a human to pick
//! one, create a deploy tag, announce it) where every step is a separate
//! pipeline job. Each invocation performs one transition and persists the
//! outcome in the build's metadata store.
//!
//! # Modules
//!
//! - `adapters`: Metadata stores, annotation sinks and notifiers
//! - `core`: Phase registry, transition engine, rendering, release flow
//! - `domain`: Progress snapshot and phase statuses
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! release-wizard --state collect_commits
//! release-wizard --state collect_commit_info --data 3f2a9c1
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{advance, PhaseDefinition, StateRegistry, TransitionEngine, TransitionError};
pub use domain::{PhaseStatus, ReleaseProgress};
