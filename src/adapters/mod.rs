//! Adapter interfaces for external systems.
//!
//! The release engine only talks to the outside world through three seams:
//! a run-scoped metadata store, an annotation sink for the build dashboard,
//! and a notification channel. Buildkite, a local file backend, Slack and
//! in-memory doubles implement them.

pub mod buildkite;
pub mod local;
pub mod memory;
pub mod slack;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use buildkite::BuildkiteAgent;
pub use local::LocalRun;
pub use memory::{InMemorySink, InMemoryStore, RecordingNotifier};
pub use slack::{Block, SlackMessage, SlackWebhook, TextObject};

/// Visual style of an annotation block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStyle {
    Info,
    Success,
    Warning,
    Error,
}

impl AnnotationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for AnnotationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("Unknown annotation style: {}", other),
        }
    }
}

/// Durable key/value store scoped to one release run
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Read a value; `None` when the key was never set
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a single value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several values as one logical update.
    ///
    /// Backends that cannot write atomically apply the entries in order.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// Styled HTML blocks shown on the build dashboard
#[async_trait]
pub trait AnnotationSink: Send + Sync {
    /// Replace the annotation under `context`
    async fn set_annotation(&self, context: &str, style: AnnotationStyle, html: &str)
        -> Result<()>;

    /// Append to the annotation under `context`
    async fn append_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()>;
}

/// Outbound chat notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &SlackMessage) -> Result<()>;
}
