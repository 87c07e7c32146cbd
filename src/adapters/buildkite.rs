//! Buildkite agent adapter.
//!
//! Shells out to the `buildkite-agent` binary available inside every
//! Buildkite job. Meta-data is scoped to the current build, which makes it
//! the durable store shared by all steps of one release run.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AnnotationSink, AnnotationStyle, MetadataStore};

/// Default timeout for a single agent call
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter around the `buildkite-agent` CLI
pub struct BuildkiteAgent {
    /// Path to the agent binary (default: "buildkite-agent")
    binary_path: String,

    /// Upper bound for one agent invocation
    call_timeout: Duration,
}

impl Default for BuildkiteAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildkiteAgent {
    pub fn new() -> Self {
        Self {
            binary_path: "buildkite-agent".to_string(),
            call_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create an adapter with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Run the agent with `args`, optionally feeding `input` on stdin.
    async fn run(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let command_line = args.join(" ");
        debug!(command = %command_line, "Invoking buildkite-agent");

        let mut child = Command::new(&self.binary_path)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn '{} {}'",
                    self.binary_path, command_line
                )
            })?;

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) {
            stdin
                .write_all(input.as_bytes())
                .await
                .context("Failed to write to buildkite-agent stdin")?;
            // Drop stdin to signal EOF
        }

        let output = timeout(self.call_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "buildkite-agent {} timed out after {:?}",
                    command_line, self.call_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for buildkite-agent {}", command_line))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "buildkite-agent {} failed with exit code {}: {}",
                command_line,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("buildkite-agent output is not valid UTF-8")
    }

    async fn annotate(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
        append: bool,
    ) -> Result<()> {
        let mut args = vec!["annotate", "--style", style.as_str(), "--context", context];
        if append {
            args.push("--append");
        }
        self.run(&args, Some(html)).await?;
        Ok(())
    }
}

/// Meta-data values come back verbatim; an empty value means "not set".
fn parse_metadata_value(raw: String) -> Option<String> {
    let value = raw.strip_suffix('\n').map(str::to_string).unwrap_or(raw);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[async_trait]
impl MetadataStore for BuildkiteAgent {
    fn name(&self) -> &str {
        "buildkite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let raw = self
            .run(&["meta-data", "get", key, "--default", ""], None)
            .await?;
        Ok(parse_metadata_value(raw))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        // Value is read from stdin when omitted, which keeps JSON out of argv
        self.run(&["meta-data", "set", key], Some(value)).await?;
        Ok(())
    }
}

#[async_trait]
impl AnnotationSink for BuildkiteAgent {
    async fn set_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        self.annotate(context, style, html, false).await
    }

    async fn append_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        self.annotate(context, style, html, true).await
    }
}
