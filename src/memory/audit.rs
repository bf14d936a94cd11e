use anyhow::{Context, Result};
use rusqlite::OptionalExtension;

use super::MemoryStore;

/// Separator used when rendering an entry for chat.
pub const DELIMITER: &str = " | ";

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub description: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.timestamp, DELIMITER, self.description)
    }
}

/// Current local time in the format stored in the audit log.
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

impl MemoryStore {
    pub async fn append_log(&self, timestamp: &str, description: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (timestamp, description) VALUES (?1, ?2)",
                self.log_table
            ),
            rusqlite::params![timestamp, description],
        )
        .context("Failed to append log entry")?;
        Ok(())
    }

    /// The most recently appended entry, by insertion order rather than
    /// timestamp.
    pub async fn latest_log(&self) -> Result<Option<LogEntry>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!(
                "SELECT timestamp, description FROM {table}
                 WHERE logID = (SELECT MAX(logID) FROM {table})",
                table = self.log_table
            ),
            [],
            |row| {
                Ok(LogEntry {
                    timestamp: row.get(0)?,
                    description: row.get(1)?,
                })
            },
        )
        .optional()
        .context("Failed to read latest log entry")
    }

    /// Delete every entry carrying `timestamp`. Returns how many were removed.
    pub async fn remove_log(&self, timestamp: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute(
                &format!("DELETE FROM {} WHERE timestamp = ?1", self.log_table),
                rusqlite::params![timestamp],
            )
            .context("Failed to remove log entry")?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_on_empty_log() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert_eq!(store.latest_log().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_latest_ignores_timestamp_order() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.append_log("2030-01-01", "first").await.unwrap();
        store.append_log("1999-01-01", "second").await.unwrap();

        let latest = store.latest_log().await.unwrap().unwrap();
        assert_eq!(latest.description, "second");
        assert_eq!(latest.to_string(), "1999-01-01 | second");
    }

    #[tokio::test]
    async fn test_remove_by_timestamp() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.append_log("t1", "kept").await.unwrap();
        store.append_log("t2", "dropped").await.unwrap();

        assert_eq!(store.remove_log("t2").await.unwrap(), 1);
        assert_eq!(store.remove_log("missing").await.unwrap(), 0);

        let latest = store.latest_log().await.unwrap().unwrap();
        assert_eq!(latest.description, "kept");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S%.6f").is_ok());
    }
}
