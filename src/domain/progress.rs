//! Persisted release progress.
//!
//! Two metadata entries make up the snapshot: the name of the phase most
//! recently entered, and a JSON object mapping phase names to statuses.

use std::collections::BTreeMap;

use super::status::PhaseStatus;

/// Snapshot of where a release run stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseProgress {
    /// Phase most recently entered
    pub current_phase: String,

    /// Status per phase; phases not yet reached have no entry
    pub phase_status: BTreeMap<String, PhaseStatus>,
}

impl ReleaseProgress {
    /// Fresh progress for a run that has not moved yet
    pub fn new(initial_phase: impl Into<String>) -> Self {
        Self {
            current_phase: initial_phase.into(),
            phase_status: BTreeMap::new(),
        }
    }

    pub fn status_of(&self, phase: &str) -> Option<PhaseStatus> {
        self.phase_status.get(phase).copied()
    }

    pub fn mark(&mut self, phase: &str, status: PhaseStatus) {
        self.phase_status.insert(phase.to_string(), status);
    }

    /// Phases currently marked pending
    pub fn pending(&self) -> Vec<&str> {
        self.phase_status
            .iter()
            .filter(|(_, status)| **status == PhaseStatus::Pending)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Encode the status map as stored in the metadata store
    pub fn encode_status(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.phase_status)
    }

    /// Decode a stored status map
    pub fn decode_status(raw: &str) -> serde_json::Result<BTreeMap<String, PhaseStatus>> {
        serde_json::from_str(raw)
    }
}
