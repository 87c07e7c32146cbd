//! File-based backend for running the wizard outside Buildkite.
//!
//! Layout of a run directory:
//!
//! ```text
//! <home>/runs/<run-id>/
//!   metadata.json          # { "updated_at": ..., "entries": { key: value } }
//!   metadata.lock          # advisory lock held while rewriting metadata.json
//!   annotations/<ctx>.html # first line records the style
//! ```

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{AnnotationSink, AnnotationStyle, MetadataStore};

const STYLE_PREFIX: &str = "<!-- style: ";
const STYLE_SUFFIX: &str = " -->";

/// On-disk shape of `metadata.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// Metadata store and annotation sink backed by a run directory
pub struct LocalRun {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to metadata.json
    metadata_path: PathBuf,

    /// Path to the lock file guarding metadata writes
    lock_path: PathBuf,

    /// Directory holding one HTML file per annotation context
    annotations_dir: PathBuf,
}

impl LocalRun {
    /// Create or open the run directory `<runs_dir>/<run_id>`
    pub async fn open(runs_dir: &Path, run_id: &str) -> Result<Self> {
        Self::open_dir(runs_dir.join(run_id)).await
    }

    /// Create or open a run directory at an explicit path
    pub async fn open_dir(run_dir: PathBuf) -> Result<Self> {
        let annotations_dir = run_dir.join("annotations");

        fs::create_dir_all(&annotations_dir).await.with_context(|| {
            format!(
                "Failed to create annotations directory: {}",
                annotations_dir.display()
            )
        })?;

        Ok(Self {
            metadata_path: run_dir.join("metadata.json"),
            lock_path: run_dir.join("metadata.lock"),
            annotations_dir,
            run_dir,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    fn annotation_path(&self, context: &str) -> PathBuf {
        self.annotations_dir.join(format!("{}.html", context))
    }

    async fn load_metadata(&self) -> Result<MetadataFile> {
        if !self.metadata_path.exists() {
            return Ok(MetadataFile::default());
        }

        let content = fs::read_to_string(&self.metadata_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read metadata file: {}",
                    self.metadata_path.display()
                )
            })?;

        parse_metadata(&content, &self.metadata_path)
    }

    /// Read an annotation back as (style, body)
    pub async fn read_annotation(&self, context: &str) -> Result<Option<(AnnotationStyle, String)>> {
        let path = self.annotation_path(context);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read annotation: {}", path.display()))?;

        Ok(Some(split_annotation(&content)?))
    }

    async fn write_annotation(&self, context: &str, style: AnnotationStyle, body: &str) -> Result<()> {
        let path = self.annotation_path(context);
        let content = format!("{}{}{}\n{}", STYLE_PREFIX, style, STYLE_SUFFIX, body);

        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write annotation: {}", path.display()))
    }
}

/// Split a stored annotation into its style header and body
fn split_annotation(content: &str) -> Result<(AnnotationStyle, String)> {
    let (header, body) = content.split_once('\n').unwrap_or((content, ""));
    let style = header
        .strip_prefix(STYLE_PREFIX)
        .and_then(|rest| rest.strip_suffix(STYLE_SUFFIX))
        .context("Annotation file is missing its style header")?
        .parse()?;
    Ok((style, body.to_string()))
}

#[async_trait]
impl MetadataStore for LocalRun {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let metadata = self.load_metadata().await?;
        Ok(metadata.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)]).await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let metadata_path = self.metadata_path.clone();
        let lock_path = self.lock_path.clone();
        let entries: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();

        tokio::task::spawn_blocking(move || write_entries(&metadata_path, &lock_path, entries))
            .await
            .context("Metadata writer task failed")?
    }
}

/// Merge `entries` into the metadata file while holding the run lock
fn write_entries(
    metadata_path: &Path,
    lock_path: &Path,
    entries: Vec<(String, String)>,
) -> Result<()> {
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    lock.lock_exclusive()
        .context("Failed to acquire lock on metadata.lock")?;

    let mut metadata = if metadata_path.exists() {
        let content = std::fs::read_to_string(metadata_path).with_context(|| {
            format!("Failed to read metadata file: {}", metadata_path.display())
        })?;
        parse_metadata(&content, metadata_path)?
    } else {
        MetadataFile::default()
    };
    metadata.entries.extend(entries);
    metadata.updated_at = Some(Utc::now());

    let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;

    // Write to a sibling file and rename so readers never see a partial file
    let tmp_path = metadata_path.with_extension("json.tmp");
    let mut tmp = std::fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    tmp.write_all(json.as_bytes())
        .context("Failed to write metadata")?;
    tmp.sync_all().context("Failed to sync metadata")?;
    std::fs::rename(&tmp_path, metadata_path).with_context(|| {
        format!(
            "Failed to move metadata into place: {}",
            metadata_path.display()
        )
    })?;

    // Lock is released when the file is dropped
    Ok(())
}

fn parse_metadata(content: &str, path: &Path) -> Result<MetadataFile> {
    serde_json::from_str(content)
        .with_context(|| format!("Failed to parse metadata file: {}", path.display()))
}

#[async_trait]
impl AnnotationSink for LocalRun {
    async fn set_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        self.write_annotation(context, style, html).await
    }

    async fn append_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        let existing = self
            .read_annotation(context)
            .await?
            .map(|(_, body)| body)
            .unwrap_or_default();
        self.write_annotation(context, style, &format!("{}{}", existing, html))
            .await
    }
}
