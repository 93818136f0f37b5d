//! Persistence collaborators for the shared document and the chat history.

pub mod dbcode;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatMessage;

/// Key of the single shared document
pub const DOCUMENT_KEY: &str = "main";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Latest-value storage for the shared document
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Latest persisted content, `None` if the document was never written
    async fn latest(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Create the document if absent, else overwrite its content
    async fn upsert_latest(&self, key: &str, content: &str) -> Result<(), StoreError>;
}

/// Append-only chat history
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError>;

    /// The most recent `limit` messages, oldest first
    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;
}
