use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::QueuedSubmission;

/// Durable FIFO of submissions written by the listener and drained by the batch run.
#[derive(Clone)]
pub struct SubmissionQueue {
    conn: Connection,
}

impl SubmissionQueue {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn push(&self, item: &QueuedSubmission) -> Result<()> {
        let payload = serde_json::to_string(item)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO submission_queue (payload) VALUES (?1)",
                    params![payload],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Raw payload at the head of the queue, without removing it.
    async fn peek_raw(&self) -> Result<Option<String>> {
        let payload = self
            .conn
            .call(|conn| {
                let payload = conn
                    .query_row(
                        "SELECT payload FROM submission_queue ORDER BY id ASC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(payload)
            })
            .await?;
        Ok(payload)
    }

    #[cfg(test)]
    pub async fn peek(&self) -> Result<Option<QueuedSubmission>> {
        match self.peek_raw().await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Removes the head of the queue, if any.
    pub async fn pop(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute(
                    "DELETE FROM submission_queue WHERE id = (SELECT MIN(id) FROM submission_queue)",
                    [],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM submission_queue", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    /// Pops submissions from the head while they are at least `lookback_hours`
    /// old, stopping at the first one that is still too fresh.
    pub async fn pop_ready(&self, lookback_hours: f64, now: DateTime<Utc>) -> Result<Vec<QueuedSubmission>> {
        let mut out = Vec::new();

        while let Some(payload) = self.peek_raw().await? {
            let item: QueuedSubmission = match serde_json::from_str(&payload) {
                Ok(item) => item,
                Err(e) => {
                    tracing::error!(error = %e, payload = %payload, "Dropping undecodable queue entry");
                    self.pop().await?;
                    continue;
                }
            };

            if item.age_hours(now) < lookback_hours {
                break;
            }

            self.pop().await?;
            out.push(item);
        }

        Ok(out)
    }
}
