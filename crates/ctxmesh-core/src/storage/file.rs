//! File storage backend: one JSONL file per table.
//!
//! Flushing appends with blocking `std::fs` calls from inside `store`, which
//! may run on an async task (`Aggregator::put_data`). Writes are small,
//! buffered appends; reads go through `tokio::fs`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use super::{FlushPolicy, Storage, StorageError, StoredRow, WriteBuffer};
use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList};

const EXTENSION: &str = "jsonl";

/// Appends rows as newline-delimited JSON under a directory. Table names are
/// percent-escaped into file names.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    buffer: WriteBuffer,
    current: RwLock<BTreeMap<String, ContextInformation>>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(directory: impl Into<PathBuf>, policy: FlushPolicy) -> Result<Self, StorageError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            buffer: WriteBuffer::new(policy),
            current: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn table_file(&self, table: &str) -> PathBuf {
        self.directory.join(format!("{}.{EXTENSION}", escape(table)))
    }

    fn write_rows(&self, rows: Vec<(String, StoredRow)>) -> Result<usize, StorageError> {
        let count = rows.len();
        let mut by_table: BTreeMap<String, Vec<StoredRow>> = BTreeMap::new();
        for (table, row) in rows {
            by_table.entry(table).or_default().push(row);
        }
        for (table, rows) in by_table {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.table_file(&table))?;
            for row in rows {
                let line = serde_json::to_string(&row)?;
                writeln!(file, "{line}")?;
            }
        }
        debug!(rows = count, directory = %self.directory.display(), "File storage flushed");
        Ok(count)
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to flush file storage on drop");
        }
    }
}

impl Storage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn store(&self, item: &ContextInformation) -> Result<(), StorageError> {
        let table = item.table_name();
        self.current
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(table.clone(), item.clone());
        if let Some(rows) = self.buffer.push(table, StoredRow::of(item))? {
            self.write_rows(rows)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<usize, StorageError> {
        let rows = self.buffer.drain()?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.write_rows(rows)
    }

    fn current_data(&self) -> Result<ContextInformationList, StorageError> {
        let current = self.current.read().map_err(|_| StorageError::Poisoned)?;
        Ok(current.values().cloned().collect())
    }

    fn retrieve_named<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<StoredRow>, StorageError>> {
        Box::pin(async move {
            self.flush()?;
            let content = match tokio::fs::read_to_string(self.table_file(table)).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).map_err(StorageError::from))
                .collect()
        })
    }

    fn names_overview(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        Box::pin(async move {
            self.flush()?;
            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match unescape(stem) {
                    Some(name) => names.push(name),
                    None => warn!(file = %path.display(), "Skipping table file with undecodable name"),
                }
            }
            names.sort();
            Ok(names)
        })
    }
}

fn escape(table: &str) -> String {
    urlencoding::encode(table).into_owned()
}

/// `None` for file stems that do not decode to UTF-8.
fn unescape(stem: &str) -> Option<String> {
    urlencoding::decode(stem).ok().map(|name| name.into_owned())
}
