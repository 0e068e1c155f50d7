// ============================
// crates/gateway-lib/src/store.rs
// ============================
//! Message store abstraction with flat-file implementation.
use crate::error::AppError;
use async_trait::async_trait;
use std::{
    fs,
    path::{Path, PathBuf},
};
use ticketchat_common::MessageRecord;
use tokio::{fs as tokio_fs, io::AsyncWriteExt};

/// Durable, append-only record of chat messages keyed by ticket
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message; must complete before the message is broadcast
    async fn append(&self, record: &MessageRecord) -> Result<(), AppError>;

    /// Read back up to `limit` of the newest messages for a ticket,
    /// returned oldest-to-newest, totally ordered by
    /// (`created_at`, `message_id`).
    async fn list_by_ticket(
        &self,
        ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, AppError>;
}

/// Flat-file implementation: one JSONL log per ticket
#[derive(Clone)]
pub struct FlatFileMessageStore {
    root: PathBuf,
}

impl FlatFileMessageStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("tickets"))?;
        Ok(Self { root })
    }

    fn log_path(&self, ticket_id: &str) -> PathBuf {
        self.root
            .join("tickets")
            .join(ticket_id)
            .join("messages.log")
    }
}

#[async_trait]
impl MessageStore for FlatFileMessageStore {
    /// Append a JSON line to `messages.log`.
    async fn append(&self, record: &MessageRecord) -> Result<(), AppError> {
        let path = self.log_path(&record.ticket_id);

        // ensure directory exists
        if let Some(parent) = path.parent() {
            tokio_fs::create_dir_all(parent).await?;
        }

        let json_line = serde_json::to_string(record)?;

        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        file.write_all(json_line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn list_by_ticket(
        &self,
        ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, AppError> {
        let path = self.log_path(ticket_id);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read_to_string(&path).await?;
        let mut records: Vec<MessageRecord> = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<MessageRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A torn tail line from a crashed write is skipped, not fatal
                    tracing::warn!(ticket_id, error = %e, "skipping unreadable log line");
                },
            }
        }

        records.sort_by_key(MessageRecord::sort_key);
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }
}
