//! Domain types for the release wizard.

pub mod progress;
pub mod status;

pub use progress::ReleaseProgress;
pub use status::PhaseStatus;
