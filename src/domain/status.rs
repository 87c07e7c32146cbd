//! Phase status values as persisted in the metadata store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a phase within a release run.
///
/// A phase without an entry in the status map has not been reached yet;
/// that implicit fourth state is modelled as `Option::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Phase was left through its declared successor and its exit hook succeeded
    Ok,

    /// Phase exit hook failed, or the phase was left by a non-linear jump
    Nok,

    /// Phase is the current target
    Pending,
}

impl PhaseStatus {
    /// Wire name, as stored in the status map
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Nok => "nok",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&PhaseStatus::Ok).unwrap(), "\"ok\"");
        assert_eq!(serde_json::to_string(&PhaseStatus::Nok).unwrap(), "\"nok\"");
        assert_eq!(
            serde_json::from_str::<PhaseStatus>("\"pending\"").unwrap(),
            PhaseStatus::Pending
        );
        assert!(serde_json::from_str::<PhaseStatus>("\"done\"").is_err());
    }
}
