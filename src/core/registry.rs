//! Phase definitions and the ordered registry.
//!
//! The declaration order of phases is the pipeline: a move is "adjacent"
//! when the target is declared immediately after the current phase.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::hooks::PhaseHook;
use crate::adapters::AnnotationStyle;

/// A single phase of the release pipeline
#[derive(Clone)]
pub struct PhaseDefinition {
    /// Phase name (persistence key, unique within the registry)
    pub name: String,

    /// Short label shown in the checklist
    pub label: String,

    /// Longer text shown under the label while the phase is pending
    pub description: String,

    /// Banner text shown while this phase is the active target
    pub instruction: Option<String>,

    /// Style of the instruction banner
    pub instruction_style: AnnotationStyle,

    /// Whether the phase appears in the checklist
    pub visible: bool,

    /// Hook run when the phase is left
    pub on_exit: Option<Arc<dyn PhaseHook>>,

    /// Hook run when the phase is entered
    pub on_enter: Option<Arc<dyn PhaseHook>>,
}

impl PhaseDefinition {
    /// A visible phase with no instruction and no hooks
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: String::new(),
            instruction: None,
            instruction_style: AnnotationStyle::Info,
            visible: true,
            on_exit: None,
            on_enter: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, text: impl Into<String>, style: AnnotationStyle) -> Self {
        self.instruction = Some(text.into());
        self.instruction_style = style;
        self
    }

    /// Keep the phase out of the checklist (bookkeeping phases)
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn on_exit(mut self, hook: impl PhaseHook + 'static) -> Self {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    pub fn on_enter(mut self, hook: impl PhaseHook + 'static) -> Self {
        self.on_enter = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for PhaseDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseDefinition")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("visible", &self.visible)
            .field("instruction_style", &self.instruction_style)
            .field("has_on_exit", &self.on_exit.is_some())
            .field("has_on_enter", &self.on_enter.is_some())
            .finish()
    }
}

/// Immutable, ordered set of phases
#[derive(Debug, Clone)]
pub struct StateRegistry {
    phases: Vec<PhaseDefinition>,
    positions: HashMap<String, usize>,
}

impl StateRegistry {
    /// Build a registry from phases in pipeline order
    pub fn new(phases: Vec<PhaseDefinition>) -> Result<Self> {
        if phases.is_empty() {
            anyhow::bail!("Registry must have at least one phase");
        }

        let mut positions = HashMap::with_capacity(phases.len());
        for (i, phase) in phases.iter().enumerate() {
            if phase.name.is_empty() {
                anyhow::bail!("Phase {} has an empty name", i);
            }
            if positions.insert(phase.name.clone(), i).is_some() {
                anyhow::bail!("Phase '{}' is declared more than once", phase.name);
            }
        }

        Ok(Self { phases, positions })
    }

    /// Look up a phase by name
    pub fn get(&self, name: &str) -> Option<&PhaseDefinition> {
        self.index_of(name).map(|i| &self.phases[i])
    }

    /// Position of a phase in declared order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// The phase a run starts in before any transition
    pub fn initial(&self) -> &PhaseDefinition {
        &self.phases[0]
    }

    /// True when `to` is declared immediately after `from`
    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(from), Some(to)) => from + 1 == to,
            _ => false,
        }
    }

    pub fn ordered_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    /// Visible phases in declared order
    pub fn visible(&self) -> impl Iterator<Item = &PhaseDefinition> {
        self.phases.iter().filter(|p| p.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateRegistry {
        StateRegistry::new(vec![
            PhaseDefinition::new("start", "Start").hidden(),
            PhaseDefinition::new("a", "Phase A").description("First real phase"),
            PhaseDefinition::new("b", "Phase B")
                .instruction("Please confirm", AnnotationStyle::Warning),
            PhaseDefinition::new("end", "End").hidden(),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = sample();

        assert_eq!(registry.ordered_names().len(), 4);
        assert_eq!(registry.index_of("b"), Some(2));
        assert_eq!(registry.index_of("missing"), None);
        assert_eq!(registry.get("a").unwrap().description, "First real phase");
        assert_eq!(registry.initial().name, "start");
        assert_eq!(registry.ordered_names(), vec!["start", "a", "b", "end"]);
        let visible: Vec<&str> = registry.visible().map(|p| p.name.as_str()).collect();
        assert_eq!(visible, vec!["a", "b"]);
    }

    #[test]
    fn test_adjacency() {
        let registry = sample();

        assert!(registry.is_adjacent("start", "a"));
        assert!(registry.is_adjacent("b", "end"));
        assert!(!registry.is_adjacent("a", "end"));
        assert!(!registry.is_adjacent("b", "a"));
        assert!(!registry.is_adjacent("a", "a"));
        assert!(!registry.is_adjacent("a", "missing"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = StateRegistry::new(vec![
            PhaseDefinition::new("start", "Start"),
            PhaseDefinition::new("start", "Again"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(StateRegistry::new(Vec::new()).is_err());
        assert!(StateRegistry::new(vec![PhaseDefinition::new("", "Nameless")]).is_err());
    }
}
