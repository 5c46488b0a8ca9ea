//! Persistence: the `Storage` contract, the fan-out facade, and the
//! bundled backends (JSONL file sink, SQLite document store).
//!
//! A search-index backend is an external collaborator implementing the
//! same trait.

mod jsonl;
mod sqlite;

pub use jsonl::JsonlSink;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One crawled page, as emitted to the persistence layer.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    /// Canonical URL as admitted to the frontier
    pub url: String,
    /// Canonical URL after redirects
    pub final_url: String,
    pub domain: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub status: u16,
    pub rendered: bool,
    /// Hex SHA-256 of the page's normalised text
    pub fingerprint: String,
    pub title: Option<String>,
    /// Extraction payload, opaque to the core
    pub payload: serde_json::Value,
}

/// Contract every persistence backend satisfies.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, record: &PageRecord) -> StorageResult<()>;

    /// Final flush before shutdown.
    async fn flush(&self) -> StorageResult<()>;

    /// Short backend name for logging.
    fn name(&self) -> &'static str;
}

/// Fan-out over all configured backends.
///
/// An individual failed write is logged and counted but never stops the
/// crawl; only backend construction failures are fatal, at setup time.
pub struct StorageSet {
    backends: Vec<Arc<dyn Storage>>,
    write_failures: AtomicU64,
}

impl StorageSet {
    pub fn new(backends: Vec<Arc<dyn Storage>>) -> Self {
        Self {
            backends,
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub async fn save(&self, record: &PageRecord) {
        for backend in &self.backends {
            if let Err(e) = backend.save(record).await {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    backend = backend.name(),
                    url = %record.url,
                    error = %e,
                    "storage write failed"
                );
            }
        }
    }

    pub async fn flush(&self) {
        for backend in &self.backends {
            if let Err(e) = backend.flush().await {
                tracing::warn!(backend = backend.name(), error = %e, "storage flush failed");
            }
        }
    }

    /// Number of individual writes that failed across all backends.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}
