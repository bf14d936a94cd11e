use anyhow::{Context, Result};

use super::MemoryStore;

impl MemoryStore {
    /// Add a todo item. Adding a description that already exists is a no-op.
    pub async fn add_item(&self, description: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO items (description) VALUES (?1)",
            rusqlite::params![description],
        )
        .context("Failed to add item")?;
        Ok(())
    }

    /// Remove a todo item. Removing a missing description is a no-op.
    pub async fn delete_item(&self, description: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM items WHERE description = ?1",
            rusqlite::params![description],
        )
        .context("Failed to delete item")?;
        Ok(())
    }

    /// All item descriptions in storage order.
    pub async fn all_items(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT description FROM items ORDER BY rowid ASC")
            .context("Failed to prepare items query")?;
        let items = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query items")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to collect items")?;
        Ok(items)
    }

    pub async fn has_item(&self, description: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let exists: bool = conn
            .query_row(
                "SELECT count(*) > 0 FROM items WHERE description = ?1",
                rusqlite::params![description],
                |row| row.get(0),
            )
            .context("Failed to look up item")?;
        Ok(exists)
    }
}
