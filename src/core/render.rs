//! Progress rendering.
//!
//! Produces the step checklist and the instruction banner from a progress
//! snapshot and pushes both to the annotation sink, replacing whatever was
//! rendered before.

use anyhow::{Context, Result};

use super::registry::{PhaseDefinition, StateRegistry};
use crate::adapters::{AnnotationSink, AnnotationStyle};
use crate::domain::{PhaseStatus, ReleaseProgress};

/// Annotation context holding the checklist
pub const CHECKLIST_CONTEXT: &str = "wizard-main";

/// Annotation context holding the instruction banner
pub const INSTRUCTION_CONTEXT: &str = "wizard-instruction";

/// Default checklist header
pub const DEFAULT_TITLE: &str = "Release wizard";

/// Emoji shortcode for a status (`None` = not reached yet)
pub fn status_glyph(status: Option<PhaseStatus>) -> &'static str {
    match status {
        Some(PhaseStatus::Ok) => ":white_check_mark:",
        Some(PhaseStatus::Nok) => ":x:",
        Some(PhaseStatus::Pending) => ":hourglass_flowing_sand:",
        None => ":white_circle:",
    }
}

/// Renders the two dashboard views
#[derive(Debug, Clone)]
pub struct ProgressRenderer {
    title: String,
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl ProgressRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Checklist of visible phases in declared order
    pub fn render_checklist(&self, registry: &StateRegistry, progress: &ReleaseProgress) -> String {
        let steps: Vec<String> = registry
            .visible()
            .map(|phase| {
                let status = progress.status_of(&phase.name);
                let glyph = status_glyph(status);

                if status == Some(PhaseStatus::Pending) {
                    format!(
                        "<div>[{}] {}<br />&nbsp; - {}</div>",
                        glyph, phase.label, phase.description
                    )
                } else {
                    format!("<div>[{}] {}</div>", glyph, phase.label)
                }
            })
            .collect();

        format!(
            "<section>\n<h3>{}</h3>\n{}\n</section>",
            self.title,
            steps.join("\n")
        )
    }

    /// Banner for a phase, if it has an instruction
    pub fn render_instruction(phase: &PhaseDefinition) -> Option<(AnnotationStyle, String)> {
        phase
            .instruction
            .as_ref()
            .map(|text| (phase.instruction_style, format!("<strong>{}</strong>", text)))
    }

    /// Push both views for the snapshot's current phase
    pub async fn publish(
        &self,
        sink: &dyn AnnotationSink,
        registry: &StateRegistry,
        progress: &ReleaseProgress,
    ) -> Result<()> {
        let checklist = self.render_checklist(registry, progress);
        sink.set_annotation(CHECKLIST_CONTEXT, AnnotationStyle::Info, &checklist)
            .await
            .context("Failed to update checklist annotation")?;

        let banner = registry
            .get(&progress.current_phase)
            .and_then(Self::render_instruction);

        if let Some((style, html)) = banner {
            sink.set_annotation(INSTRUCTION_CONTEXT, style, &html)
                .await
                .context("Failed to update instruction annotation")?;
        }

        Ok(())
    }
}
