use crate::models::{AttachmentRecord, MessageRecord};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Result of persisting one record. Conflicts count as `Stored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    Failed(String),
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database. Pinned to one connection so every
    /// query sees the same data.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts the record, or refreshes `is_read` and `body` when the id is
    /// already known. Every other column keeps its first-insert value.
    pub async fn upsert_message(&self, record: &MessageRecord) -> StoreOutcome {
        match self.try_upsert_message(record).await {
            Ok(true) => {
                info!(message_id = %record.id, "Stored new email");
                StoreOutcome::Stored
            }
            Ok(false) => {
                info!(message_id = %record.id, "Updated existing email");
                StoreOutcome::Stored
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(message_id = %record.id, "Duplicate email detected");
                StoreOutcome::Stored
            }
            Err(e) => {
                error!(message_id = %record.id, "Database error storing email: {}", e);
                StoreOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_upsert_message(&self, record: &MessageRecord) -> Result<bool, sqlx::Error> {
        let existed = self.message_exists(&record.id).await?;

        sqlx::query(
            "INSERT INTO emails (id, thread_id, sender, recipients, subject, body, observed_at, is_read, labels, has_attachment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET is_read=excluded.is_read, body=excluded.body",
        )
        .bind(&record.id)
        .bind(&record.thread_id)
        .bind(&record.sender)
        .bind(&record.recipients)
        .bind(&record.subject)
        .bind(&record.body)
        .bind(record.observed_at)
        .bind(record.is_read)
        .bind(&record.labels)
        .bind(record.has_attachment)
        .execute(&self.pool)
        .await?;

        Ok(!existed)
    }

    pub async fn upsert_attachments(&self, attachments: &[AttachmentRecord]) -> Result<()> {
        for attachment in attachments {
            sqlx::query(
                "INSERT OR IGNORE INTO attachments (id, email_id, filename, mime_type, size)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&attachment.id)
            .bind(&attachment.email_id)
            .bind(&attachment.filename)
            .bind(&attachment.mime_type)
            .bind(attachment.size)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Bodies of the `limit` most recently observed messages in a thread,
    /// newest first. Lookup errors yield an empty list.
    pub async fn recent_thread(&self, thread_id: &str, limit: u32) -> Vec<String> {
        let rows = sqlx::query(
            "SELECT body FROM emails
             WHERE thread_id = ?
             ORDER BY observed_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(thread_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.into_iter().map(|row| row.get(0)).collect(),
            Err(e) => {
                warn!(thread_id, "Error getting thread history: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn message_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM emails WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[cfg(test)]
    pub async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, thread_id, sender, recipients, subject, body, observed_at, is_read, has_attachment, labels
             FROM emails WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[cfg(test)]
    pub async fn count_messages(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    #[cfg(test)]
    pub async fn get_attachments(&self, email_id: &str) -> Result<Vec<AttachmentRecord>> {
        let rows = sqlx::query_as::<_, AttachmentRecord>(
            "SELECT id, email_id, filename, mime_type, size FROM attachments
             WHERE email_id = ? ORDER BY filename ASC",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn close(&self) {
        debug!("Closing database pool");
        self.pool.close().await;
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
