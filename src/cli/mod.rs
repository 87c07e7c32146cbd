//! Command-line interface for the release wizard.
//!
//! Each invocation performs one transition of the release run and prints the
//! phase the run ends up in.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

use crate::adapters::{
    AnnotationSink, BuildkiteAgent, LocalRun, MetadataStore, Notifier, SlackWebhook,
};
use crate::config::{self, Backend, ResolvedConfig};
use crate::core::{advance, release_registry, ProgressRenderer, TransitionEngine};

/// release-wizard - Human-gated release pipeline state machine
#[derive(Parser, Debug)]
#[command(name = "release-wizard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Phase to transition into
    #[arg(long, value_name = "PHASE")]
    pub state: String,

    /// Payload handed to the phase hooks
    #[arg(long, value_name = "PAYLOAD")]
    pub data: Option<String>,

    /// Where metadata and annotations live
    #[arg(long, value_enum, env = "RELEASE_WIZARD_BACKEND")]
    pub backend: Option<Backend>,
}

impl Cli {
    /// Execute the requested transition
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let backend = self.backend.unwrap_or(cfg.backend);

        let engine = build_engine(cfg, backend).await?;

        let summary = run(&engine, &self.state, self.data.as_deref()).await?;
        println!("{}", summary);
        Ok(())
    }
}

/// Perform one transition and describe where the run ended up
pub async fn run(engine: &TransitionEngine, state: &str, data: Option<&str>) -> Result<String> {
    match advance(engine, state, data).await {
        Ok(phase) => Ok(format!("Transition completed to: {}", phase)),
        Err(e) => {
            error!(phase = %state, error = %e, "Transition failed");
            Err(e).with_context(|| format!("Failed to transition to '{}'", state))
        }
    }
}

/// Wire the configured backend and notifier into an engine
async fn build_engine(cfg: &ResolvedConfig, backend: Backend) -> Result<TransitionEngine> {
    let store: Arc<dyn MetadataStore>;
    let sink: Arc<dyn AnnotationSink>;

    match backend {
        Backend::Buildkite => {
            let agent = Arc::new(
                BuildkiteAgent::with_binary_path(&cfg.agent.binary)
                    .with_timeout(Duration::from_secs(cfg.agent.timeout_seconds)),
            );
            store = agent.clone();
            sink = agent;
        }
        Backend::Local => {
            let local = Arc::new(LocalRun::open(&cfg.runs_dir(), &cfg.run_id).await?);
            debug!(run_dir = %local.run_dir().display(), "Using local release run");
            store = local.clone();
            sink = local;
        }
    }

    let webhook = SlackWebhook::new(
        cfg.slack_webhook_url.clone(),
        cfg.announcement.dispatch_timeout,
    )?;
    let slack_configured = webhook.is_configured();
    let notifier: Arc<dyn Notifier> = Arc::new(webhook);
    let registry = release_registry(notifier, cfg.announcement.clone())
        .context("Failed to build the release flow")?;

    debug!(
        config_file = ?cfg.config_file,
        backend = store.name(),
        slack_configured,
        phases = ?registry.ordered_names(),
        "Release wizard configured"
    );

    Ok(TransitionEngine::new(Arc::new(registry), store, sink)
        .with_renderer(ProgressRenderer::new(&cfg.title)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemorySink, InMemoryStore, RecordingNotifier};
    use crate::config::AnnouncementSettings;
    use crate::core::TransitionError;

    fn memory_engine() -> TransitionEngine {
        let registry = release_registry(
            Arc::new(RecordingNotifier::new()),
            AnnouncementSettings::default(),
        )
        .unwrap();
        TransitionEngine::new(
            Arc::new(registry),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemorySink::new()),
        )
    }

    #[tokio::test]
    async fn test_run_reports_resulting_phase() {
        let engine = memory_engine();

        let summary = run(&engine, "initialize", None).await.unwrap();
        assert_eq!(summary, "Transition completed to: initialize");
    }

    #[tokio::test]
    async fn test_run_fails_on_unknown_state() {
        let engine = memory_engine();

        let err = run(&engine, "bogus", Some("abc")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransitionError>(),
            Some(TransitionError::UnknownPhase(name)) if name == "bogus"
        ));
        assert!(format!("{:#}", err).contains("Failed to transition to 'bogus'"));
    }

    #[test]
    fn test_parse_state_and_data() {
        let cli = Cli::try_parse_from([
            "release-wizard",
            "--state",
            "wait_for_selection",
            "--data",
            "abc123",
            "--backend",
            "local",
        ])
        .unwrap();

        assert_eq!(cli.state, "wait_for_selection");
        assert_eq!(cli.data.as_deref(), Some("abc123"));
        assert_eq!(cli.backend, Some(Backend::Local));
    }

    #[test]
    fn test_state_is_required() {
        assert!(Cli::try_parse_from(["release-wizard", "--data", "x"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(
            Cli::try_parse_from(["release-wizard", "--state", "end", "--backend", "s3"]).is_err()
        );
    }
}
