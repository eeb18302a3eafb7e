use std::collections::HashSet;
use std::path::Path;

use crate::error::{AppError, Result};

/// Hosts whose articles are never stored.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    hosts: HashSet<String>,
}

impl Blacklist {
    /// Reads one host per line. Only the first comma-separated column is used;
    /// blank lines and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Blacklist(format!("cannot read {}: {}", path.display(), e))
        })?;
        let blacklist = Self::parse(&content);
        tracing::debug!(path = %path.display(), hosts = blacklist.len(), "Loaded blacklist");
        Ok(blacklist)
    }

    pub fn parse(content: &str) -> Self {
        let hosts = content
            .lines()
            .map(|line| line.split(',').next().unwrap_or("").trim())
            .filter(|host| !host.is_empty() && !host.starts_with('#'))
            .map(|host| host.to_ascii_lowercase())
            .collect();
        Self { hosts }
    }

    #[cfg(test)]
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse(
            &hosts
                .into_iter()
                .map(|h| h.as_ref().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.trim().to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}
