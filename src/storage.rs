use crate::api::models::Conversation;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub fn default_db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "InboxSync")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

// Caching fetched conversations so the inbox renders before the first fetch completes
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS conversations (
                client_id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replaces the cached set with `conversations`, keeping their order.
    pub fn store_conversations(&mut self, conversations: &[Conversation], now: i64) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conversations", [])?;
        for (idx, c) in conversations.iter().enumerate() {
            let raw = serde_json::to_string(c).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                r#"
                INSERT INTO conversations (client_id, position, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(client_id) DO UPDATE SET
                    position=excluded.position,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![c.client_id, idx as i64, now, raw],
            )?;
        }
        tx.commit()
    }

    /// Cached conversations in their stored order. Rows that no longer decode are skipped.
    pub fn conversations(&self, limit: Option<usize>) -> rusqlite::Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT client_id, raw_json FROM conversations ORDER BY position ASC LIMIT ?1")?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for r in rows {
            let (client_id, raw) = r?;
            match serde_json::from_str::<Conversation>(&raw) {
                Ok(c) => out.push(c),
                Err(e) => log::warn!("dropping cached conversation {client_id}: {e}"),
            }
        }
        Ok(out)
    }

    pub fn updated_at(&self, client_id: &str) -> rusqlite::Result<Option<i64>> {
        let mut stmt = self.conn.prepare("SELECT updated_at FROM conversations WHERE client_id = ?1")?;
        stmt.query_row(params![client_id], |row| row.get(0)).optional()
    }
}
