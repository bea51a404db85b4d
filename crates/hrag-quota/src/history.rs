//! Per-document query history
//!
//! Every question a user asks and every answer they get is appended to the
//! history of each document the answer drew from. A document also carries
//! an optional free-text description given at upload time.
//!
//! Keys:
//!
//! - `history:{id}:{filename}` (list of JSON entries, oldest first)
//! - `history:{id}:{filename}:description`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hrag_core::{HragError, Namespace, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::CounterStore;

fn entries_key(namespace: &Namespace, source: &str) -> String {
    format!("history:{namespace}:{source}")
}

fn description_key(namespace: &Namespace, source: &str) -> String {
    format!("history:{namespace}:{source}:description")
}

/// One message in a document's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub content: String,
    /// True for the user's question, false for the generated answer
    pub by_user: bool,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn question(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            by_user: true,
            created_at: Utc::now(),
        }
    }

    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            by_user: false,
            created_at: Utc::now(),
        }
    }
}

/// Bounded question/answer history per user document
#[derive(Clone)]
pub struct QueryHistory {
    store: Arc<dyn CounterStore>,
    per_document: usize,
}

impl QueryHistory {
    /// `per_document` is the number of entries kept per document; zero
    /// turns recording off
    pub fn new(store: Arc<dyn CounterStore>, per_document: usize) -> Self {
        Self {
            store,
            per_document,
        }
    }

    pub fn per_document(&self) -> usize {
        self.per_document
    }

    /// Append a question and its answer to every cited document
    pub async fn record(
        &self,
        namespace: &Namespace,
        sources: &[String],
        question: &str,
        answer: &str,
    ) -> Result<()> {
        if self.per_document == 0 {
            return Ok(());
        }
        let entries = [HistoryEntry::question(question), HistoryEntry::answer(answer)];
        let encoded = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HragError::StoreError(format!("Failed to encode history entry: {e}")))?;

        for source in sources {
            let key = entries_key(namespace, source);
            for value in &encoded {
                self.store.push_capped(&key, value, self.per_document).await?;
            }
        }
        debug!(user = %namespace, documents = sources.len(), "History recorded");
        Ok(())
    }

    /// Entries of one document, oldest first
    pub async fn entries(&self, namespace: &Namespace, source: &str) -> Result<Vec<HistoryEntry>> {
        let raw = self.store.list(&entries_key(namespace, source)).await?;
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(user = %namespace, source, "Skipping unreadable history entry: {e}");
                    None
                }
            })
            .collect())
    }

    /// Drop the entries of the given documents; the descriptions stay
    pub async fn clear(&self, namespace: &Namespace, sources: &[String]) -> Result<()> {
        let keys: Vec<String> = sources.iter().map(|s| entries_key(namespace, s)).collect();
        self.store.delete(&keys).await
    }

    /// Drop everything kept for a document
    pub async fn forget(&self, namespace: &Namespace, sources: &[String]) -> Result<()> {
        let keys: Vec<String> = sources
            .iter()
            .flat_map(|s| [entries_key(namespace, s), description_key(namespace, s)])
            .collect();
        self.store.delete(&keys).await
    }

    /// Store a document description; blank text removes it
    pub async fn set_description(
        &self,
        namespace: &Namespace,
        source: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let key = description_key(namespace, source);
        match description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(text) => self.store.set(&key, text).await,
            None => self.store.delete(&[key]).await,
        }
    }

    pub async fn description(&self, namespace: &Namespace, source: &str) -> Result<Option<String>> {
        self.store.get(&description_key(namespace, source)).await
    }
}
