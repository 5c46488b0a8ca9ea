//! SQLite document store for crawled pages.

use crate::storage::{PageRecord, Storage, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::Mutex;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    final_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    depth INTEGER NOT NULL,
    parent_url TEXT,
    fetched_at TEXT NOT NULL,
    status INTEGER NOT NULL,
    rendered INTEGER NOT NULL,
    fingerprint TEXT NOT NULL,
    title TEXT,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain);
CREATE INDEX IF NOT EXISTS idx_pages_fingerprint ON pages(fingerprint);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, for tests.
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn page_count(&self) -> StorageResult<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub async fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT url, final_url, domain, depth, parent_url, fetched_at, status, rendered,
                    fingerprint, title, payload
             FROM pages WHERE url = ?1",
        )?;

        let mut rows = stmt.query(params![url])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let fetched_at: String = row.get(5)?;
        let payload: String = row.get(10)?;
        Ok(Some(PageRecord {
            url: row.get(0)?,
            final_url: row.get(1)?,
            domain: row.get(2)?,
            depth: row.get(3)?,
            parent_url: row.get(4)?,
            fetched_at: fetched_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
            status: row.get(6)?,
            rendered: row.get(7)?,
            fingerprint: row.get(8)?,
            title: row.get(9)?,
            payload: serde_json::from_str(&payload)?,
        }))
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn save(&self, record: &PageRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO pages
                (url, final_url, domain, depth, parent_url, fetched_at, status, rendered,
                 fingerprint, title, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.url,
                record.final_url,
                record.domain,
                record.depth,
                record.parent_url,
                record.fetched_at.to_rfc3339(),
                record.status,
                record.rendered,
                record.fingerprint,
                record.title,
                payload,
            ],
        )?;
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        // rusqlite commits per statement; nothing buffered here.
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
