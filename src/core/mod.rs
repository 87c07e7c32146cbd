//! Core release wizard logic.
//!
//! This module contains:
//! - Registry: Ordered phase definitions
//! - Engine: Single-step transitions over the persisted progress
//! - Render: Checklist and instruction banner
//! - Release: The deploy-tag release flow

pub mod engine;
pub mod hooks;
pub mod registry;
pub mod release;
pub mod render;

// Re-export commonly used types
pub use engine::{TransitionEngine, TransitionError, CURRENT_PHASE_KEY, PHASE_STATUS_KEY};
pub use hooks::{HookContext, HookOutcome, PhaseHook};
pub use registry::{PhaseDefinition, StateRegistry};
pub use release::{advance, release_announcement, release_registry};
pub use render::{ProgressRenderer, CHECKLIST_CONTEXT, INSTRUCTION_CONTEXT};
