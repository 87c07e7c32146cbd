//! Phase entry/exit hooks.
//!
//! Hooks are side effects attached to a phase (annotate the dashboard,
//! announce a release). Whatever they do, the engine only learns a
//! [`HookOutcome`]: errors are logged and folded into `Failure`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapters::{AnnotationSink, MetadataStore};
use crate::domain::PhaseStatus;

/// Result of running a hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Success,
    Failure(String),
}

impl HookOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Everything a hook may look at or touch while it runs
pub struct HookContext<'a> {
    /// Phase the hook belongs to
    pub phase: &'a str,

    /// Opaque `--data` payload of the current invocation
    pub payload: Option<&'a str>,

    /// Status map as it stands when the hook runs
    pub phase_status: &'a BTreeMap<String, PhaseStatus>,

    /// Run-scoped metadata store
    pub store: &'a dyn MetadataStore,

    /// Dashboard annotations
    pub sink: &'a dyn AnnotationSink,
}

/// A side effect run when a phase is entered or left
#[async_trait]
pub trait PhaseHook: Send + Sync {
    async fn run(&self, ctx: &HookContext<'_>) -> Result<HookOutcome>;
}

/// Which side of a phase a hook runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Enter,
    Exit,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "on_enter",
            Self::Exit => "on_exit",
        }
    }
}

/// Run an optional hook and normalize its result.
///
/// A missing hook succeeds trivially; an error becomes `Failure`.
pub async fn invoke_hook(
    kind: HookKind,
    hook: Option<&Arc<dyn PhaseHook>>,
    ctx: &HookContext<'_>,
) -> HookOutcome {
    let Some(hook) = hook else {
        return HookOutcome::Success;
    };

    debug!(phase = ctx.phase, hook = kind.as_str(), "Running hook");

    match hook.run(ctx).await {
        Ok(HookOutcome::Success) => HookOutcome::Success,
        Ok(HookOutcome::Failure(reason)) => {
            warn!(phase = ctx.phase, hook = kind.as_str(), %reason, "Hook reported failure");
            HookOutcome::Failure(reason)
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(phase = ctx.phase, hook = kind.as_str(), error = %reason, "Hook failed");
            HookOutcome::Failure(reason)
        }
    }
}
