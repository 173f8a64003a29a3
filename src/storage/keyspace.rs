use crate::catalog::types::{Row, Value};
use im::{HashMap, OrdMap};
use serde::{Deserialize, Serialize};

pub type PrimaryKey = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub rows: OrdMap<PrimaryKey, Row>,
    /// Commit sequence of the last write to each row.
    pub row_versions: OrdMap<PrimaryKey, u64>,
}

/// Row storage for domain tables, keyed by table name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Keyspace {
    pub tables: HashMap<String, TableData>,
}

impl Keyspace {
    pub fn table(&self, table_name: &str) -> Option<&TableData> {
        self.tables.get(table_name)
    }

    pub fn get_row(&self, table_name: &str, primary_key: &[Value]) -> Option<&Row> {
        self.tables
            .get(table_name)
            .and_then(|t| t.rows.get(primary_key))
    }

    pub fn upsert_row(&mut self, table_name: &str, primary_key: PrimaryKey, row: Row, seq: u64) {
        let table = self.tables.entry(table_name.to_string()).or_default();
        table.row_versions.insert(primary_key.clone(), seq);
        table.rows.insert(primary_key, row);
    }

    pub fn delete_row(&mut self, table_name: &str, primary_key: &[Value]) -> Option<Row> {
        let table = self.tables.get_mut(table_name)?;
        table.row_versions.remove(primary_key);
        table.rows.remove(primary_key)
    }

    pub fn drop_table(&mut self, table_name: &str) {
        self.tables.remove(table_name);
    }

    pub fn row_count(&self, table_name: &str) -> usize {
        self.tables.get(table_name).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn row_version(&self, table_name: &str, primary_key: &[Value]) -> Option<u64> {
        self.tables
            .get(table_name)
            .and_then(|t| t.row_versions.get(primary_key).copied())
    }
}
