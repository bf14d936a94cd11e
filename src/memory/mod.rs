pub mod audit;
pub mod items;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// SQLite store holding the todo items and the audit log.
///
/// Access is serialized through one connection; the bot only ever touches it
/// from the polling task.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
    log_table: String,
}

impl MemoryStore {
    /// Open or create the SQLite database at the given path.
    /// `log_table` must already be validated as a bare identifier.
    pub fn open(path: &Path, log_table: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn, log_table)?;

        info!("Memory store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            log_table: log_table.to_string(),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn, "logs")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            log_table: "logs".to_string(),
        })
    }

    fn run_migrations(conn: &Connection, log_table: &str) -> Result<()> {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS items (
                description TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS {log_table} (
                logID INTEGER PRIMARY KEY,
                timestamp TEXT,
                description TEXT
            );
            "
        ))
        .context("Failed to run migrations")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        MemoryStore::run_migrations(&conn, "plant_log").unwrap();
        MemoryStore::run_migrations(&conn, "plant_log").unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('items', 'plant_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
