use async_trait::async_trait;
use rusqlite::params;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::traits::DedupCache;

/// Dedup cache backed by the `seen_links` table.
///
/// Every operation runs inside a single `Connection::call`, and the
/// connection executes calls one at a time, so `claim` is atomic with
/// respect to every other cache operation.
#[derive(Clone)]
pub struct SqliteDedupCache {
    conn: Connection,
}

impl SqliteDedupCache {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn usable(keys: &[String]) -> Vec<String> {
    let mut out: Vec<String> = keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[async_trait]
impl DedupCache for SqliteDedupCache {
    async fn is_member(&self, key: &str) -> Result<bool> {
        let key = key.trim().to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists = conn
                    .prepare_cached("SELECT 1 FROM seen_links WHERE key = ?1")?
                    .exists(params![key])?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    async fn add(&self, key: &str) -> Result<()> {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO seen_links (key) VALUES (?1)",
                    params![key],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn claim(&self, keys: &[String]) -> Result<bool> {
        let keys = usable(keys);
        let claimed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut exists = tx.prepare("SELECT 1 FROM seen_links WHERE key = ?1")?;
                    for key in &keys {
                        if exists.exists(params![key])? {
                            return Ok(false);
                        }
                    }
                    let mut insert = tx.prepare("INSERT INTO seen_links (key) VALUES (?1)")?;
                    for key in &keys {
                        insert.execute(params![key])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(claimed)
    }

    async fn release(&self, keys: &[String]) -> Result<()> {
        let keys = usable(keys);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut delete = tx.prepare("DELETE FROM seen_links WHERE key = ?1")?;
                    for key in &keys {
                        delete.execute(params![key])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
