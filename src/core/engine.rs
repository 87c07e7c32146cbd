//! Transition engine.
//!
//! Each invocation of the wizard performs one transition: read the persisted
//! progress, run the exit hook of the phase being left and the entry hook of
//! the target, persist the new snapshot, then re-render the dashboard.
//!
//! Any target is accepted. Only a move to the immediate successor can mark
//! the departed phase `ok`; every other move marks it `nok`, which lets
//! error and recovery phases be reached from anywhere.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::hooks::{invoke_hook, HookContext, HookKind};
use super::registry::StateRegistry;
use super::render::ProgressRenderer;
use crate::adapters::{AnnotationSink, MetadataStore};
use crate::domain::{PhaseStatus, ReleaseProgress};

/// Metadata key holding the current phase name
pub const CURRENT_PHASE_KEY: &str = "release_state";

/// Metadata key holding the JSON status map
pub const PHASE_STATUS_KEY: &str = "state_data";

/// Fatal transition errors. Hook failures never surface here.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Could not find phase '{0}' in the release flow")]
    UnknownPhase(String),

    #[error("Corrupt release state: {0}")]
    CorruptState(String),

    #[error("Metadata store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Drives phase transitions for one release run
pub struct TransitionEngine {
    registry: Arc<StateRegistry>,
    store: Arc<dyn MetadataStore>,
    sink: Arc<dyn AnnotationSink>,
    renderer: ProgressRenderer,
}

impl TransitionEngine {
    pub fn new(
        registry: Arc<StateRegistry>,
        store: Arc<dyn MetadataStore>,
        sink: Arc<dyn AnnotationSink>,
    ) -> Self {
        Self {
            registry,
            store,
            sink,
            renderer: ProgressRenderer::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: ProgressRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// Read and validate the persisted progress.
    ///
    /// Missing entries fall back to the initial phase and an empty status
    /// map. Names the registry does not know are reported, never repaired.
    pub async fn progress(&self) -> Result<ReleaseProgress, TransitionError> {
        let current_phase = self
            .store
            .get(CURRENT_PHASE_KEY)
            .await?
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.registry.initial().name.clone());

        if !self.registry.contains(&current_phase) {
            return Err(TransitionError::CorruptState(format!(
                "current phase '{}' is not part of the release flow",
                current_phase
            )));
        }

        let phase_status = match self.store.get(PHASE_STATUS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => ReleaseProgress::decode_status(&raw)
                .map_err(|e| {
                    TransitionError::CorruptState(format!("unreadable phase status map: {}", e))
                })?,
            _ => Default::default(),
        };

        if let Some(unknown) = phase_status
            .keys()
            .find(|name| !self.registry.contains(name))
        {
            return Err(TransitionError::CorruptState(format!(
                "phase status map references unknown phase '{}'",
                unknown
            )));
        }

        Ok(ReleaseProgress {
            current_phase,
            phase_status,
        })
    }

    /// Move the run to `target_name` and return the phase now current
    #[instrument(skip(self, payload), fields(phase = %target_name))]
    pub async fn transition(
        &self,
        target_name: &str,
        payload: Option<&str>,
    ) -> Result<String, TransitionError> {
        let mut progress = self.progress().await?;

        let current = self
            .registry
            .get(&progress.current_phase)
            .ok_or_else(|| TransitionError::UnknownPhase(progress.current_phase.clone()))?;
        let target = self
            .registry
            .get(target_name)
            .ok_or_else(|| TransitionError::UnknownPhase(target_name.to_string()))?;

        let adjacent = self.registry.is_adjacent(&current.name, &target.name);
        debug!(from = %current.name, to = %target.name, adjacent, "Resolved transition");

        let exit_outcome = {
            let ctx = HookContext {
                phase: &current.name,
                payload,
                phase_status: &progress.phase_status,
                store: self.store.as_ref(),
                sink: self.sink.as_ref(),
            };
            invoke_hook(HookKind::Exit, current.on_exit.as_ref(), &ctx).await
        };

        let departed = if adjacent && exit_outcome.is_success() {
            PhaseStatus::Ok
        } else {
            PhaseStatus::Nok
        };
        if !adjacent {
            warn!(
                from = %current.name,
                to = %target.name,
                "Target is not the next phase, marking departed phase as failed"
            );
        }
        progress.mark(&current.name, departed);
        progress.mark(&target.name, PhaseStatus::Pending);

        {
            let ctx = HookContext {
                phase: &target.name,
                payload,
                phase_status: &progress.phase_status,
                store: self.store.as_ref(),
                sink: self.sink.as_ref(),
            };
            // Entry proceeds whatever the hook reports
            invoke_hook(HookKind::Enter, target.on_enter.as_ref(), &ctx).await;
        }

        progress.current_phase = target.name.clone();
        self.persist(&progress).await?;

        info!(
            from = %current.name,
            to = %target.name,
            departed = %departed,
            "Transition completed"
        );

        if let Err(e) = self
            .renderer
            .publish(self.sink.as_ref(), &self.registry, &progress)
            .await
        {
            let reason = format!("{:#}", e);
            error!(error = %reason, "Failed to render release progress");
        }

        Ok(target.name.clone())
    }

    /// Write status map and current phase as one logical update.
    ///
    /// The status map goes first: a reader that sees the new phase name
    /// always sees the status map that goes with it.
    async fn persist(&self, progress: &ReleaseProgress) -> Result<(), TransitionError> {
        let status_json = progress.encode_status().map_err(anyhow::Error::from)?;

        self.store
            .set_many(&[
                (PHASE_STATUS_KEY, status_json.as_str()),
                (CURRENT_PHASE_KEY, progress.current_phase.as_str()),
            ])
            .await?;

        Ok(())
    }
}
