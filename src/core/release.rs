//! The deploy-tag release flow.
//!
//! Phases are declared in pipeline order. The three trailing bookkeeping
//! phases are hidden from the checklist; `error_generic` is reachable from
//! anywhere through a non-adjacent jump.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{info, warn};

use super::engine::{TransitionEngine, TransitionError};
use super::hooks::{HookContext, HookOutcome, PhaseHook};
use super::registry::{PhaseDefinition, StateRegistry};
use super::render::INSTRUCTION_CONTEXT;
use crate::adapters::{AnnotationStyle, Block, Notifier, SlackMessage, TextObject};
use crate::config::AnnouncementSettings;

/// Phase names of the release flow
pub mod phase {
    pub const START: &str = "start";
    pub const INITIALIZE: &str = "initialize";
    pub const COLLECT_COMMITS: &str = "collect_commits";
    pub const WAIT_FOR_SELECTION: &str = "wait_for_selection";
    pub const COLLECT_COMMIT_INFO: &str = "collect_commit_info";
    pub const WAIT_FOR_CONFIRMATION: &str = "wait_for_confirmation";
    pub const CREATE_DEPLOY_TAG: &str = "create_deploy_tag";
    pub const TAG_CREATED: &str = "tag_created";
    pub const END: &str = "end";
    pub const ERROR_GENERIC: &str = "error_generic";
}

/// Reaching this phase immediately closes the run
pub const SUCCESS_PHASE: &str = phase::TAG_CREATED;

/// Final phase entered after [`SUCCESS_PHASE`]
pub const CLOSING_PHASE: &str = phase::END;

/// Annotation context shared with the commit-info collectors
pub const COMMIT_INFO_CONTEXT: &str = "commit-info";

/// Metadata key holding the created deploy tag
pub const DEPLOY_TAG_KEY: &str = "deploy-tag";

/// Metadata key holding the selected commit SHA
pub const SELECTED_COMMIT_KEY: &str = "selected-commit-hash";

/// Replaces an annotation with fixed HTML
pub struct SetAnnotation {
    context: &'static str,
    style: AnnotationStyle,
    html: String,
}

impl SetAnnotation {
    pub fn new(context: &'static str, style: AnnotationStyle, html: impl Into<String>) -> Self {
        Self {
            context,
            style,
            html: html.into(),
        }
    }
}

#[async_trait]
impl PhaseHook for SetAnnotation {
    async fn run(&self, ctx: &HookContext<'_>) -> Result<HookOutcome> {
        ctx.sink
            .set_annotation(self.context, self.style, &self.html)
            .await?;
        Ok(HookOutcome::Success)
    }
}

/// Celebrates the deploy tag on the dashboard and announces it
pub struct AnnounceDeployTag {
    notifier: Arc<dyn Notifier>,
    settings: AnnouncementSettings,
}

impl AnnounceDeployTag {
    pub fn new(notifier: Arc<dyn Notifier>, settings: AnnouncementSettings) -> Self {
        Self { notifier, settings }
    }
}

#[async_trait]
impl PhaseHook for AnnounceDeployTag {
    async fn run(&self, ctx: &HookContext<'_>) -> Result<HookOutcome> {
        let deploy_tag = ctx.store.get(DEPLOY_TAG_KEY).await?;
        let selected_commit = ctx.store.get(SELECTED_COMMIT_KEY).await?;

        let (Some(deploy_tag), Some(selected_commit)) = (deploy_tag, selected_commit) else {
            return Ok(HookOutcome::Failure(format!(
                "'{}' or '{}' is missing from the build metadata",
                DEPLOY_TAG_KEY, SELECTED_COMMIT_KEY
            )));
        };

        let html = format!(
            "<h3>Deploy tag successfully created!</h3><br/>\n\
             Your deployment will appear <a href='{}'>here on buildkite.</a>",
            builds_for_tag(&self.settings, &deploy_tag)
        );
        ctx.sink
            .set_annotation(INSTRUCTION_CONTEXT, AnnotationStyle::Success, &html)
            .await?;

        let message = release_announcement(&self.settings, &selected_commit, &deploy_tag);
        match timeout(self.settings.dispatch_timeout, self.notifier.notify(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "Couldn't send release announcement");
            }
            Err(_) => {
                warn!(
                    timeout = ?self.settings.dispatch_timeout,
                    "Release announcement timed out, continuing without it"
                );
            }
        }

        Ok(HookOutcome::Success)
    }
}

fn builds_for_tag(settings: &AnnouncementSettings, deploy_tag: &str) -> String {
    format!("{}?branch={}", settings.release_builds_url, deploy_tag)
}

/// Slack announcement for a freshly created deploy tag
pub fn release_announcement(
    settings: &AnnouncementSettings,
    selected_commit: &str,
    deploy_tag: &str,
) -> SlackMessage {
    let build_shortname = format!(
        "{} #{}",
        settings.pipeline_slug.as_deref().unwrap_or("release"),
        settings.build_number.as_deref().unwrap_or("?")
    );
    let build_url = settings.build_url.as_deref().unwrap_or("about://blank");
    let commit_url = format!("{}/commit/{}", settings.repository_url, selected_commit);
    let short_sha = selected_commit.get(..12).unwrap_or(selected_commit);

    let mut headline = vec![
        format!(
            ":ship: Promotion of a new <{}|commit> to QA has been initiated!",
            commit_url
        ),
        format!(
            ":mag: The details of the candidate selection can be found here: <{}|{}>",
            build_url, build_shortname
        ),
        ":test_tube: Once promotion is complete, please begin any required manual testing."
            .to_string(),
        "*Remember:* Promotion to Staging is currently a manual process and will proceed once the build is signed off in QA."
            .to_string(),
    ];
    if settings.dry_run {
        headline.push("*:white_check_mark:This is a dry run, no action will be taken.*".to_string());
    }

    let fields = vec![
        TextObject::markdown(&[
            "*More detail on the candidate selection:*".to_string(),
            format!("<{}|{}>", build_url, build_shortname),
        ]),
        TextObject::markdown(&[
            "*Initiated by:*",
            settings.build_creator.as_deref().unwrap_or("unknown"),
        ]),
        TextObject::markdown(&[
            "*Git tag:*".to_string(),
            format!(
                "<{}/releases/tag/{}|{}>",
                settings.repository_url, deploy_tag, deploy_tag
            ),
        ]),
        TextObject::markdown(&[
            "*QA Deploy job:*".to_string(),
            format!("<{}|Link>", builds_for_tag(settings, deploy_tag)),
        ]),
        TextObject::markdown(&[
            "*Commit:*".to_string(),
            format!("<{}|{}>", commit_url, short_sha),
        ]),
    ];

    SlackMessage {
        blocks: vec![Block::text(TextObject::markdown(&headline)), Block::fields(fields)],
    }
}

/// Build the release flow registry
pub fn release_registry(
    notifier: Arc<dyn Notifier>,
    settings: AnnouncementSettings,
) -> Result<StateRegistry> {
    StateRegistry::new(vec![
        PhaseDefinition::new(phase::START, "Starting state")
            .description("No description")
            .hidden()
            .on_exit(SetAnnotation::new(
                COMMIT_INFO_CONTEXT,
                AnnotationStyle::Info,
                "<h4>:kibana: Release candidates</h4>",
            )),
        PhaseDefinition::new(phase::INITIALIZE, "Initializing")
            .description("The job is starting up.")
            .instruction(
                "Wait while we bootstrap. Follow the instructions displayed in this block.",
                AnnotationStyle::Info,
            ),
        PhaseDefinition::new(phase::COLLECT_COMMITS, "Collecting commits")
            .description("Collecting potential commits for the release.")
            .instruction(
                "Please wait, while we're collecting the list of available commits.",
                AnnotationStyle::Info,
            ),
        PhaseDefinition::new(phase::WAIT_FOR_SELECTION, "Waiting for selection")
            .description("Waiting for the Release Manager to select a release candidate commit.")
            .instruction(
                "Please find, copy and enter a commit SHA to the buildkite input box to proceed.",
                AnnotationStyle::Warning,
            ),
        PhaseDefinition::new(phase::COLLECT_COMMIT_INFO, "Collecting commit info")
            .description("Collecting supplementary info about the selected commit.")
            .instruction(
                "Please wait, while we're collecting data about the commit, and the release candidate.",
                AnnotationStyle::Info,
            )
            .on_enter(SetAnnotation::new(
                COMMIT_INFO_CONTEXT,
                AnnotationStyle::Info,
                "<h4>:kibana: Selected release candidate info:</h4>",
            )),
        PhaseDefinition::new(phase::WAIT_FOR_CONFIRMATION, "Waiting for confirmation")
            .description("Waiting for the Release Manager to confirm the release.")
            .instruction(
                "Please review the collected information above and unblock the release on Buildkite, if you're satisfied.",
                AnnotationStyle::Warning,
            ),
        PhaseDefinition::new(phase::CREATE_DEPLOY_TAG, "Creating deploy tag")
            .description("Creating the deploy tag, this will be picked up by another pipeline.")
            .instruction(
                "Please wait, while we're creating the deploy@timestamp tag.",
                AnnotationStyle::Info,
            ),
        PhaseDefinition::new(phase::TAG_CREATED, "Release tag created")
            .description(
                "The initial step release is completed, follow up jobs will be triggered soon.",
            )
            .instruction("<h3>Deploy tag successfully created!</h3>", AnnotationStyle::Success)
            .on_exit(AnnounceDeployTag::new(notifier, settings)),
        PhaseDefinition::new(phase::END, "End of the release process")
            .description("The release process has ended.")
            .hidden(),
        PhaseDefinition::new(phase::ERROR_GENERIC, "Encountered an error")
            .description("An error occurred during the release process.")
            .instruction(
                "<h4>Please check the build logs for more information.</h4>",
                AnnotationStyle::Error,
            )
            .hidden(),
    ])
}

/// Perform the requested transition, closing the run once the tag exists.
///
/// Returns the phase the run ends up in.
pub async fn advance(
    engine: &TransitionEngine,
    target: &str,
    payload: Option<&str>,
) -> Result<String, TransitionError> {
    let reached = engine.transition(target, payload).await?;

    if reached == SUCCESS_PHASE {
        info!(phase = %reached, "Release tag created, closing the release run");
        return engine.transition(CLOSING_PHASE, None).await;
    }

    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotifier;
    use std::time::Duration;

    fn settings() -> AnnouncementSettings {
        AnnouncementSettings {
            repository_url: "https://github.com/acme/widget".to_string(),
            release_builds_url: "https://buildkite.com/acme/widget-release/builds".to_string(),
            build_url: Some("https://buildkite.com/acme/widget-release/builds/7".to_string()),
            build_number: Some("7".to_string()),
            build_creator: Some("Jordan".to_string()),
            pipeline_slug: Some("widget-release".to_string()),
            dry_run: false,
            dispatch_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_release_phase_order() {
        let registry = release_registry(Arc::new(RecordingNotifier::new()), settings()).unwrap();

        assert_eq!(
            registry.ordered_names(),
            vec![
                "start",
                "initialize",
                "collect_commits",
                "wait_for_selection",
                "collect_commit_info",
                "wait_for_confirmation",
                "create_deploy_tag",
                "tag_created",
                "end",
                "error_generic",
            ]
        );
        assert_eq!(registry.initial().name, phase::START);
        assert_eq!(registry.visible().count(), 7);
        assert!(registry.is_adjacent(SUCCESS_PHASE, CLOSING_PHASE));
        assert!(registry.get(phase::TAG_CREATED).unwrap().on_exit.is_some());
        assert!(registry.get(phase::COLLECT_COMMIT_INFO).unwrap().on_enter.is_some());
    }

    #[test]
    fn test_announcement_content() {
        let message = release_announcement(&settings(), "0123456789abcdef0123", "deploy@1700000000");

        assert_eq!(message.blocks.len(), 2);
        let Block::Section { text: Some(headline), .. } = &message.blocks[0] else {
            panic!("first block should be a text section");
        };
        assert!(headline
            .text
            .contains("<https://github.com/acme/widget/commit/0123456789abcdef0123|commit>"));
        assert!(headline
            .text
            .contains("<https://buildkite.com/acme/widget-release/builds/7|widget-release #7>"));
        assert!(!headline.text.contains("dry run"));

        let Block::Section { fields: Some(fields), .. } = &message.blocks[1] else {
            panic!("second block should be a field section");
        };
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1].text, "*Initiated by:*\nJordan");
        assert_eq!(
            fields[2].text,
            "*Git tag:*\n<https://github.com/acme/widget/releases/tag/deploy@1700000000|deploy@1700000000>"
        );
        assert_eq!(
            fields[3].text,
            "*QA Deploy job:*\n<https://buildkite.com/acme/widget-release/builds?branch=deploy@1700000000|Link>"
        );
        assert_eq!(
            fields[4].text,
            "*Commit:*\n<https://github.com/acme/widget/commit/0123456789abcdef0123|0123456789ab>"
        );
    }

    #[test]
    fn test_announcement_dry_run_and_fallbacks() {
        let bare = AnnouncementSettings {
            dry_run: true,
            ..AnnouncementSettings::default()
        };
        let message = release_announcement(&bare, "abc", "deploy@1");

        let Block::Section { text: Some(headline), .. } = &message.blocks[0] else {
            panic!("first block should be a text section");
        };
        assert!(headline.text.ends_with("*:white_check_mark:This is a dry run, no action will be taken.*"));
        assert!(headline.text.contains("<about://blank|release #?>"));

        let Block::Section { fields: Some(fields), .. } = &message.blocks[1] else {
            panic!("second block should be a field section");
        };
        assert_eq!(fields[1].text, "*Initiated by:*\nunknown");
        assert!(fields[4].text.ends_with("|abc>"));
    }
}
