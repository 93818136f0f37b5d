use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};

use super::{ChatStore, DocumentStore, StoreError};
use crate::models::ChatMessage;

/// Chat message row from the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct ChatMessageRow {
    username: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            username: row.username,
            text: row.text,
            timestamp: row.created_at,
        }
    }
}

const SCHEMA_SQL: [&str; 3] = [
    r#"
        CREATE TABLE IF NOT EXISTS code_documents (
            document_id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id BIGSERIAL PRIMARY KEY,
            document_id TEXT NOT NULL,
            username TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
    "#,
    r#"
        CREATE INDEX IF NOT EXISTS chat_messages_document_created
            ON chat_messages (document_id, created_at)
    "#,
];

/// PostgreSQL backed document and chat store
pub struct DbCode {
    pool: PgPool,
}

impl DbCode {
    /// Create a new database connection pool and make sure the tables exist
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<(), SqlxError> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    fn log_pool(&self, action: &str, key: &str) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "{} for document {}. Pool connections: {} idle, {} in use",
            action,
            key,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

#[async_trait]
impl DocumentStore for DbCode {
    async fn latest(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.log_pool("Loading code", key);

        let code: Option<String> =
            sqlx::query_scalar("SELECT code FROM code_documents WHERE document_id = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(code)
    }

    async fn upsert_latest(&self, key: &str, content: &str) -> Result<(), StoreError> {
        let query_sql = r#"
            INSERT INTO code_documents(document_id, code, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (document_id)
            DO UPDATE SET code = EXCLUDED.code, updated_at = NOW();
        "#;
        sqlx::query(query_sql)
            .bind(key)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Failed to save code for document {}: {}. Pool state: {} idle, {} total",
                    key,
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                e
            })?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for DbCode {
    async fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError> {
        let query_sql = r#"
            INSERT INTO chat_messages(document_id, username, text, created_at)
            VALUES ($1, $2, $3, $4);
        "#;
        sqlx::query(query_sql)
            .bind(key)
            .bind(&message.username)
            .bind(&message.text)
            .bind(message.timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        self.log_pool("Loading chat history", key);

        // Newest first so LIMIT keeps the most recent ones, reversed below
        let query_sql = r#"
            SELECT username, text, created_at
            FROM chat_messages
            WHERE document_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
        "#;
        let rows = sqlx::query_as::<_, ChatMessageRow>(query_sql)
            .bind(key)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().rev().map(ChatMessage::from).collect())
    }
}
