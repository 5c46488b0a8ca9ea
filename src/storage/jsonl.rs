//! JSONL file sink: one page record per line.

use crate::storage::{PageRecord, Storage, StorageResult};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::sync::Mutex;

pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Opens the sink in append mode, so an interrupted crawl's output is
    /// kept.
    pub fn new(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl Storage for JsonlSink {
    async fn save(&self, record: &PageRecord) -> StorageResult<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        self.writer.lock().await.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
