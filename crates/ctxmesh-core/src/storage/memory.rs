//! In-memory storage backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use super::{FlushPolicy, Storage, StorageError, StoredRow, WriteBuffer};
use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList};

/// Keeps every table in memory. Rows are lost on restart.
#[derive(Debug)]
pub struct InMemoryStorage {
    buffer: WriteBuffer,
    tables: RwLock<BTreeMap<String, Vec<StoredRow>>>,
    current: RwLock<BTreeMap<String, ContextInformation>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(FlushPolicy::default())
    }
}

impl InMemoryStorage {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            buffer: WriteBuffer::new(policy),
            tables: RwLock::new(BTreeMap::new()),
            current: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rows buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.buffer.pending()
    }

    /// Rows written so far, across all tables.
    pub fn total_rows(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn write_rows(&self, rows: Vec<(String, StoredRow)>) -> Result<usize, StorageError> {
        let count = rows.len();
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        for (table, row) in rows {
            tables.entry(table).or_default().push(row);
        }
        debug!(rows = count, "In-memory storage flushed");
        Ok(count)
    }
}

impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        "memory"
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
            let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
            Ok(tables.get(table).cloned().unwrap_or_default())
        })
    }

    fn names_overview(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        Box::pin(async move {
            self.flush()?;
            let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
            Ok(tables.keys().cloned().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Parameter;
    use serde_json::json;
    use std::time::Duration;

    fn battery(value: i64) -> ContextInformation {
        ContextInformation::new("CI_BATTERY", "INTEGER", Vec::new()).with_value(value)
    }

    fn lazy() -> InMemoryStorage {
        InMemoryStorage::new(FlushPolicy {
            max_pending: 100,
            max_age: Duration::from_secs(3600),
        })
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let storage = lazy();
        storage.store(&battery(40)).unwrap();
        storage.store(&battery(41)).unwrap();
        assert_eq!(storage.pending(), 2);
        assert_eq!(storage.total_rows(), 0);

        let rows = storage.retrieve_named("CI_BATTERY").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, json!(41));
        assert_eq!(rows[0].data_type, "INTEGER");
        assert_eq!(storage.pending(), 0);
    }

    #[tokio::test]
    async fn test_tables_keyed_by_parameters() {
        let storage = lazy();
        let km = ContextInformation::new(
            "CI_DISTANCE",
            "FLOAT",
            vec![Parameter::new("CP_UNIT", "STRING", "KILOMETERS")],
        )
        .with_value(3.0);
        storage.store(&km).unwrap();
        storage.store(&battery(1)).unwrap();

        let names = storage.names_overview().await.unwrap();
        assert_eq!(names, vec!["CI_BATTERY", "CI_DISTANCE[CP_UNIT=KILOMETERS]"]);
    }

    #[test]
    fn test_current_data_holds_latest() {
        let storage = lazy();
        storage.store(&battery(1)).unwrap();
        storage.store(&battery(2)).unwrap();
        let current = storage.current_data().unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current.iter().next().unwrap().value(), &json!(2));
    }

    #[test]
    fn test_count_threshold_writes_through() {
        let storage = InMemoryStorage::new(FlushPolicy {
            max_pending: 2,
            max_age: Duration::from_secs(3600),
        });
        storage.store(&battery(1)).unwrap();
        assert_eq!(storage.total_rows(), 0);
        storage.store(&battery(2)).unwrap();
        assert_eq!(storage.total_rows(), 2);
        assert_eq!(storage.flush().unwrap(), 0);
    }
}
