//! Slack incoming-webhook client for release announcements.
//!
//! Endpoint: POST <webhook url>
//! Body: `{ "blocks": [...] }` using Block Kit section blocks.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Notifier;

/// A Block Kit message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub blocks: Vec<Block>,
}

/// Supported block types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<TextObject>>,
    },
}

impl Block {
    /// Section with a single text object
    pub fn text(text: TextObject) -> Self {
        Self::Section {
            text: Some(text),
            fields: None,
        }
    }

    /// Section rendered as a two-column field group
    pub fn fields(fields: Vec<TextObject>) -> Self {
        Self::Section {
            text: None,
            fields: Some(fields),
        }
    }
}

/// Text object (always mrkdwn here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextObject {
    /// mrkdwn text built from lines joined with newlines
    pub fn markdown<S: AsRef<str>>(lines: &[S]) -> Self {
        Self {
            kind: "mrkdwn".to_string(),
            text: lines
                .iter()
                .map(|line| line.as_ref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Webhook client
pub struct SlackWebhook {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackWebhook {
    /// Create a client; without a URL every dispatch is skipped
    pub fn new(webhook_url: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build Slack HTTP client")?;

        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn notify(&self, message: &SlackMessage) -> Result<()> {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!("No Slack webhook configured, skipping notification");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .context("Failed to send Slack message")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack webhook error ({}): {}", status, text);
        }

        Ok(())
    }
}
