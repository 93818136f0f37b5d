use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{ChatStore, DocumentStore, StoreError};
use crate::models::ChatMessage;

/// Process-local store used when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, String>>,
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only the next `calls` calls fail
    pub fn fail_next(&self, calls: usize) {
        self.fail_next.store(calls, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        let pending = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(StoreError::Unavailable("memory store failing on request".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn latest(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn upsert_latest(&self, key: &str, content: &str) -> Result<(), StoreError> {
        self.check()?;
        self.documents
            .write()
            .await
            .insert(key.to_string(), content.to_string());
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError> {
        self.check()?;
        self.messages
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        self.check()?;
        let messages = self.messages.read().await;
        let history = messages.get(key).map(Vec::as_slice).unwrap_or_default();
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DOCUMENT_KEY;
    use chrono::{Duration, Utc};

    fn message(n: i64) -> ChatMessage {
        ChatMessage {
            username: "alice".to_string(),
            text: format!("message {n}"),
            timestamp: Utc::now() + Duration::milliseconds(n),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_overwrites() {
        let store = MemoryStore::new();
        assert_eq!(store.latest(DOCUMENT_KEY).await.unwrap(), None);

        store.upsert_latest(DOCUMENT_KEY, "a = 1").await.unwrap();
        store.upsert_latest(DOCUMENT_KEY, "a = 2").await.unwrap();
        assert_eq!(store.latest(DOCUMENT_KEY).await.unwrap().as_deref(), Some("a = 2"));
    }

    #[tokio::test]
    async fn recent_returns_newest_messages_oldest_first() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store.append(DOCUMENT_KEY, &message(n)).await.unwrap();
        }

        let recent = store.recent(DOCUMENT_KEY, 3).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);

        assert_eq!(store.recent(DOCUMENT_KEY, 100).await.unwrap().len(), 5);
        assert!(store.recent("other", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_mode_rejects_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.latest(DOCUMENT_KEY).await.is_err());
        assert!(store.append(DOCUMENT_KEY, &message(0)).await.is_err());

        store.set_failing(false);
        assert!(store.recent(DOCUMENT_KEY, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_next_counts_down_then_recovers() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(store.upsert_latest(DOCUMENT_KEY, "a = 1").await.is_err());
        assert!(store.append(DOCUMENT_KEY, &message(0)).await.is_err());

        store.upsert_latest(DOCUMENT_KEY, "a = 2").await.unwrap();
        assert_eq!(store.latest(DOCUMENT_KEY).await.unwrap().as_deref(), Some("a = 2"));
        assert!(store.recent(DOCUMENT_KEY, 10).await.unwrap().is_empty());
    }
}
