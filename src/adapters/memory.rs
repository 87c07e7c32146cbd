//! In-memory adapters.
//!
//! Used by tests and dry runs; everything is lost when the process exits.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AnnotationSink, AnnotationStyle, MetadataStore, Notifier, SlackMessage};

/// Metadata store held in a map
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            writes: Mutex::new(0),
        }
    }

    /// Copy of all entries
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().await.clone()
    }

    /// Number of write calls (`set` or `set_many`) seen so far
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)]).await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.entries.lock().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        *self.writes.lock().await += 1;
        Ok(())
    }
}

/// One call made against an [`InMemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub context: String,
    pub style: AnnotationStyle,
    pub html: String,
    pub append: bool,
}

/// Annotation sink that keeps the current block per context plus a call log
#[derive(Debug, Default)]
pub struct InMemorySink {
    current: Mutex<BTreeMap<String, (AnnotationStyle, String)>>,
    history: Mutex<Vec<AnnotationRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current annotation for a context
    pub async fn annotation(&self, context: &str) -> Option<(AnnotationStyle, String)> {
        self.current.lock().await.get(context).cloned()
    }

    /// Every call in order
    pub async fn history(&self) -> Vec<AnnotationRecord> {
        self.history.lock().await.clone()
    }

    async fn record(&self, context: &str, style: AnnotationStyle, html: &str, append: bool) {
        let mut current = self.current.lock().await;
        let body = match (append, current.get(context)) {
            (true, Some((_, existing))) => format!("{}{}", existing, html),
            _ => html.to_string(),
        };
        current.insert(context.to_string(), (style, body));

        self.history.lock().await.push(AnnotationRecord {
            context: context.to_string(),
            style,
            html: html.to_string(),
            append,
        });
    }
}

#[async_trait]
impl AnnotationSink for InMemorySink {
    async fn set_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        self.record(context, style, html, false).await;
        Ok(())
    }

    async fn append_annotation(
        &self,
        context: &str,
        style: AnnotationStyle,
        html: &str,
    ) -> Result<()> {
        self.record(context, style, html, true).await;
        Ok(())
    }
}

/// Notifier that records messages, optionally failing every dispatch
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<SlackMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every dispatch fails after being recorded
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn messages(&self) -> Vec<SlackMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &SlackMessage) -> Result<()> {
        self.messages.lock().await.push(message.clone());
        if self.fail {
            anyhow::bail!("Notification channel unavailable");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_counts_writes() {
        let store = InMemoryStore::with_entries([("release_state", "start")]);
        assert_eq!(store.write_count().await, 0);

        store
            .set_many(&[("release_state", "initialize"), ("state_data", "{}")])
            .await
            .unwrap();

        assert_eq!(store.write_count().await, 1);
        assert_eq!(
            store.get("release_state").await.unwrap(),
            Some("initialize".to_string())
        );
    }

    #[tokio::test]
    async fn test_sink_replace_vs_append() {
        let sink = InMemorySink::new();
        sink.set_annotation("ctx", AnnotationStyle::Info, "a").await.unwrap();
        sink.append_annotation("ctx", AnnotationStyle::Info, "b").await.unwrap();
        assert_eq!(
            sink.annotation("ctx").await,
            Some((AnnotationStyle::Info, "ab".to_string()))
        );

        sink.set_annotation("ctx", AnnotationStyle::Error, "c").await.unwrap();
        assert_eq!(
            sink.annotation("ctx").await,
            Some((AnnotationStyle::Error, "c".to_string()))
        );
        assert_eq!(sink.history().await.len(), 3);
    }
}
