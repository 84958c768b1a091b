//! Table-oriented key/value state store
//!
//! Rows are addressed by `(table, row)` and hold string fields. The store is the
//! single source of truth shared by the reconciliation pass, the boot timers,
//! and the fan control loop, so every writer uses read-compare-write.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Fields of one row
pub type Fields = BTreeMap<String, String>;

/// All rows of all tables
pub type TableMap = BTreeMap<String, BTreeMap<String, Fields>>;

/// Persisted key/value state store
pub trait StateStore: Send + Sync {
    /// Upsert every given field of a row
    fn set(&self, table: &str, row: &str, fields: &[(&str, String)]) -> Result<()>;

    /// Read one field. `None` when the row or the field is absent.
    fn get_field(&self, table: &str, row: &str, field: &str) -> Result<Option<String>>;

    /// Upsert one field
    fn set_field(&self, table: &str, row: &str, field: &str, value: &str) -> Result<()>;

    /// Read a whole row
    fn get_entry(&self, table: &str, row: &str) -> Result<Option<Fields>>;

    /// Delete a row. Deleting an absent row is not an error.
    fn delete_entry(&self, table: &str, row: &str) -> Result<()>;

    /// Row keys of `table` containing `pattern` as a substring
    fn scan_keys(&self, table: &str, pattern: &str) -> Result<Vec<String>>;
}

/// In-process state store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<TableMap>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: TableMap) -> Self {
        Self {
            tables: RwLock::new(tables),
            writes: AtomicU64::new(0),
        }
    }

    pub(crate) fn tables(&self) -> TableMap {
        self.tables.read().clone()
    }

    /// Number of mutating calls served so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map(|rows| rows.len()).unwrap_or(0)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn set(&self, table: &str, row: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables
            .entry(table.to_string())
            .or_default()
            .entry(row.to_string())
            .or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), value.clone());
        }
        self.record_write();
        Ok(())
    }

    fn get_field(&self, table: &str, row: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(row))
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    fn set_field(&self, table: &str, row: &str, field: &str, value: &str) -> Result<()> {
        self.set(table, row, &[(field, value.to_string())])
    }

    fn get_entry(&self, table: &str, row: &str) -> Result<Option<Fields>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(row))
            .cloned())
    }

    fn delete_entry(&self, table: &str, row: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(row);
            if rows.is_empty() {
                tables.remove(table);
            }
        }
        self.record_write();
        Ok(())
    }

    fn scan_keys(&self, table: &str, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| {
                rows.keys()
                    .filter(|key| key.contains(pattern))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_merges_fields() {
        let store = MemoryStore::new();
        store.set("FAN", "FAN-1-1", &[("a", "1".into()), ("b", "2".into())]).unwrap();
        store.set("FAN", "FAN-1-1", &[("b", "3".into())]).unwrap();

        let row = store.get_entry("FAN", "FAN-1-1").unwrap().unwrap();
        assert_eq!(row.get("a").map(String::as_str), Some("1"));
        assert_eq!(row.get("b").map(String::as_str), Some("3"));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_delete_missing_row_is_ok() {
        let store = MemoryStore::new();
        store.delete_entry("PSU", "PSU-1-1").unwrap();
        assert_eq!(store.get_field("PSU", "PSU-1-1", "empty").unwrap(), None);
    }

    #[test]
    fn test_scan_keys_substring() {
        let store = MemoryStore::new();
        store.set_field("CURALARM", "LINECARD-1-1|TEMP_HIGH", "severity", "MAJOR").unwrap();
        store.set_field("CURALARM", "FAN-1-1|FAN_LOW", "severity", "MINOR").unwrap();

        let keys = store.scan_keys("CURALARM", "LINECARD").unwrap();
        assert_eq!(keys, vec!["LINECARD-1-1|TEMP_HIGH".to_string()]);
        assert!(store.scan_keys("NOPE", "").unwrap().is_empty());
    }
}
