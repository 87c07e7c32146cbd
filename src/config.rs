//! Configuration for the release wizard.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RELEASE_WIZARD_HOME, SLACK_WEBHOOK_URL, DRY_RUN,
//!    BUILDKITE_* build information)
//! 2. Config file (.release-wizard/config.yaml)
//! 3. Defaults (~/.release-wizard)
//!
//! Config file discovery:
//! - Searches current directory and parents for .release-wizard/config.yaml
//! - `paths.home` is relative to the .release-wizard/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

use crate::core::render::DEFAULT_TITLE;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".release-wizard";
const DEFAULT_AGENT_BINARY: &str = "buildkite-agent";
const DEFAULT_AGENT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_SLACK_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_REPOSITORY_URL: &str = "https://github.com/elastic/kibana";
const DEFAULT_RELEASE_BUILDS_URL: &str =
    "https://buildkite.com/elastic/kibana-serverless-release/builds";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub wizard: Option<WizardConfig>,
    #[serde(default)]
    pub links: Option<LinksConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub agent: Option<AgentConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Local state directory (relative to .release-wizard/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WizardConfig {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinksConfig {
    pub repository_url: Option<String>,
    pub release_builds_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub binary: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Where release metadata and annotations are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// buildkite-agent meta-data and annotations
    Buildkite,

    /// Files under the local home directory
    Local,
}

/// Build information used in the release announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementSettings {
    /// Base URL of the source repository (commit and tag links)
    pub repository_url: String,

    /// Build list of the release pipeline, filtered by `?branch=<tag>`
    pub release_builds_url: String,

    pub build_url: Option<String>,
    pub build_number: Option<String>,
    pub build_creator: Option<String>,
    pub pipeline_slug: Option<String>,

    /// Announce that no action will be taken
    pub dry_run: bool,

    /// Upper bound for sending the announcement
    pub dispatch_timeout: Duration,
}

impl Default for AnnouncementSettings {
    fn default() -> Self {
        Self {
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            release_builds_url: DEFAULT_RELEASE_BUILDS_URL.to_string(),
            build_url: None,
            build_number: None,
            build_creator: None,
            pipeline_slug: None,
            dry_run: false,
            dispatch_timeout: Duration::from_secs(DEFAULT_SLACK_TIMEOUT_SECONDS),
        }
    }
}

/// buildkite-agent invocation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub binary: String,
    pub timeout_seconds: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_AGENT_BINARY.to_string(),
            timeout_seconds: DEFAULT_AGENT_TIMEOUT_SECONDS,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Local state directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Default backend when none is given on the command line
    pub backend: Backend,
    /// Identifier of the release run (Buildkite build id, or "local")
    pub run_id: String,
    /// Checklist header
    pub title: String,
    pub slack_webhook_url: Option<String>,
    pub agent: AgentSettings,
    pub announcement: AnnouncementSettings,
}

impl ResolvedConfig {
    /// Directory holding one subdirectory per local run
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Merge file, environment and defaults.
///
/// `env` is injected so tests do not depend on the process environment.
fn resolve_config<F>(
    config_path: Option<PathBuf>,
    file: Option<ConfigFile>,
    env: F,
    default_home: PathBuf,
) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = env("RELEASE_WIZARD_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            let home = file.as_ref()?.paths.home.as_ref()?;
            Some(resolve_path(config_dir.as_deref()?, home))
        })
        .unwrap_or(default_home);

    let title = file
        .as_ref()
        .and_then(|f| f.wizard.as_ref())
        .and_then(|w| w.title.clone())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let links = file.as_ref().and_then(|f| f.links.as_ref());
    let slack_file = file.as_ref().and_then(|f| f.slack.as_ref());
    let defaults = AnnouncementSettings::default();
    let announcement = AnnouncementSettings {
        repository_url: links
            .and_then(|l| l.repository_url.clone())
            .unwrap_or(defaults.repository_url),
        release_builds_url: links
            .and_then(|l| l.release_builds_url.clone())
            .unwrap_or(defaults.release_builds_url),
        build_url: env("BUILDKITE_BUILD_URL"),
        build_number: env("BUILDKITE_BUILD_NUMBER"),
        build_creator: env("BUILDKITE_BUILD_CREATOR"),
        pipeline_slug: env("BUILDKITE_PIPELINE_SLUG"),
        dry_run: env("DRY_RUN").map(|v| is_truthy(&v)).unwrap_or(false),
        dispatch_timeout: slack_file
            .and_then(|s| s.timeout_seconds)
            .map(Duration::from_secs)
            .unwrap_or(defaults.dispatch_timeout),
    };

    let slack_webhook_url =
        env("SLACK_WEBHOOK_URL").or_else(|| slack_file.and_then(|s| s.webhook_url.clone()));

    let agent_file = file.as_ref().and_then(|f| f.agent.as_ref());
    let agent = AgentSettings {
        binary: env("BUILDKITE_AGENT_PATH")
            .or_else(|| agent_file.and_then(|a| a.binary.clone()))
            .unwrap_or_else(|| DEFAULT_AGENT_BINARY.to_string()),
        timeout_seconds: agent_file
            .and_then(|a| a.timeout_seconds)
            .unwrap_or(DEFAULT_AGENT_TIMEOUT_SECONDS),
    };

    let backend = if env("BUILDKITE").map(|v| is_truthy(&v)).unwrap_or(false) {
        Backend::Buildkite
    } else {
        Backend::Local
    };

    ResolvedConfig {
        home,
        config_file: config_path,
        backend,
        run_id: env("BUILDKITE_BUILD_ID").unwrap_or_else(|| "local".to_string()),
        title,
        slack_webhook_url,
        agent,
        announcement,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_path = find_config_file();
    let file = match config_path {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    Ok(resolve_config(config_path, file, env_var, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve_config(None, None, env_from(&[]), PathBuf::from("/home/rm/.release-wizard"));

        assert_eq!(config.home, PathBuf::from("/home/rm/.release-wizard"));
        assert_eq!(config.runs_dir(), PathBuf::from("/home/rm/.release-wizard/runs"));
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.run_id, "local");
        assert_eq!(config.title, DEFAULT_TITLE);
        assert_eq!(config.agent, AgentSettings::default());
        assert_eq!(config.announcement, AnnouncementSettings::default());
        assert!(config.slack_webhook_url.is_none());
    }

    #[test]
    fn test_buildkite_environment() {
        let env = env_from(&[
            ("BUILDKITE", "true"),
            ("BUILDKITE_BUILD_ID", "0190-abc"),
            ("BUILDKITE_BUILD_URL", "https://buildkite.com/acme/release/builds/12"),
            ("BUILDKITE_BUILD_NUMBER", "12"),
            ("BUILDKITE_BUILD_CREATOR", "Release Manager"),
            ("DRY_RUN", "1"),
            ("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T/B/X"),
        ]);
        let config = resolve_config(None, None, env, PathBuf::from("/tmp/rw"));

        assert_eq!(config.backend, Backend::Buildkite);
        assert_eq!(config.run_id, "0190-abc");
        assert_eq!(config.announcement.build_number.as_deref(), Some("12"));
        assert_eq!(
            config.announcement.build_creator.as_deref(),
            Some("Release Manager")
        );
        assert!(config.announcement.dry_run);
        assert_eq!(
            config.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.com/services/T/B/X")
        );
    }

    #[test]
    fn test_dry_run_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
wizard:
  title: "Serverless deployment wizard"
links:
  repository_url: https://github.com/acme/widget
slack:
  webhook_url: https://hooks.slack.com/services/file
  timeout_seconds: 3
agent:
  timeout_seconds: 5
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.paths.home, Some("./state".to_string()));

        let config = resolve_config(
            Some(config_path.clone()),
            Some(parsed),
            env_from(&[("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/env")]),
            PathBuf::from("/unused"),
        );

        assert_eq!(config.home, config_dir.join("state"));
        assert_eq!(config.title, "Serverless deployment wizard");
        assert_eq!(config.announcement.repository_url, "https://github.com/acme/widget");
        assert_eq!(
            config.announcement.release_builds_url,
            DEFAULT_RELEASE_BUILDS_URL
        );
        // environment wins over the file
        assert_eq!(
            config.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.com/services/env")
        );
        assert_eq!(config.agent.binary, DEFAULT_AGENT_BINARY);
        assert_eq!(config.agent.timeout_seconds, 5);
        assert_eq!(config.announcement.dispatch_timeout, Duration::from_secs(3));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.release-wizard");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./state"),
            PathBuf::from("/home/user/project/.release-wizard/./state")
        );
    }
}
