//! In-memory table store.
//!
//! Stands in for the host database. It understands exactly the two
//! statements the query engine emits:
//!
//! ```text
//! INSERT INTO <table> (<field>) VALUES (json('<document>'))
//! SELECT "id", json("<field>") as "<field>" FROM "<table>" ORDER BY "id" DESC
//! ```
//!
//! Ids start at 1 and increase per table. Writers to one table are
//! serialized; writers to different tables never wait on each other.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

static INSERT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)^INSERT INTO (\w+) \((\w+)\) VALUES \(json\('(.*)'\)\)$").ok()
});

static SELECT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"^SELECT "id", json\("(\w+)"\) as "(\w+)" FROM "(\w+)" ORDER BY "id" DESC$"#).ok()
});

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Table was never created
    #[error("no such table: {table}")]
    NoSuchTable {
        /// Table name
        table: String,
    },

    /// Statement is not one the store understands
    #[error("unsupported statement: {statement}")]
    Unsupported {
        /// The statement
        statement: String,
    },

    /// Inserted document is not JSON
    #[error("malformed JSON: {reason}")]
    MalformedJson {
        /// Decoder message
        reason: String,
    },
}

/// One stored row
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    id: u64,
    columns: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    rows: Vec<Row>,
}

impl Table {
    fn insert(&mut self, field: &str, document: String) -> u64 {
        self.next_id += 1;
        let mut columns = BTreeMap::new();
        columns.insert(field.to_string(), document);
        self.rows.push(Row {
            id: self.next_id,
            columns,
        });
        self.next_id
    }
}

/// Named tables of JSON documents
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<HashMap<String, Arc<Mutex<Table>>>>,
}

impl TableStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table; an existing table is left untouched
    pub fn create_table(&self, name: impl Into<String>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(name.into()).or_default();
    }

    /// True if the table exists
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of rows in a table
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchTable`] if the table does not exist
    pub async fn count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.table(table)?.lock().await.rows.len())
    }

    /// Run a mutating statement and return the rows written
    ///
    /// # Errors
    ///
    /// Returns error if the statement is not an insert, the table does not
    /// exist, or the document is not JSON
    pub async fn execute(&self, statement: &str) -> Result<u64, StoreError> {
        let captures = INSERT
            .as_ref()
            .and_then(|re| re.captures(statement))
            .ok_or_else(|| unsupported(statement))?;
        let (table, field, literal) = (&captures[1], &captures[2], &captures[3]);

        let document: Value = serde_json::from_str(&literal.replace("''", "'"))
            .map_err(|e| StoreError::MalformedJson {
                reason: e.to_string(),
            })?;

        let handle = self.table(table)?;
        let id = handle.lock().await.insert(field, document.to_string());
        tracing::debug!(table, id, "row inserted");
        Ok(1)
    }

    /// Run a reading statement, newest row first
    ///
    /// Each row is `{ "id": <id>, "<field>": "<document text>" }`; the
    /// document column is `null` for rows that never set it.
    ///
    /// # Errors
    ///
    /// Returns error if the statement is not a select or the table does
    /// not exist
    pub async fn query(&self, statement: &str) -> Result<Vec<Value>, StoreError> {
        let captures = SELECT
            .as_ref()
            .and_then(|re| re.captures(statement))
            .ok_or_else(|| unsupported(statement))?;
        let (field, alias, table) = (&captures[1], &captures[2], &captures[3]);

        let handle = self.table(table)?;
        let table = handle.lock().await;
        let rows = table
            .rows
            .iter()
            .rev()
            .map(|row| {
                let mut object = Map::new();
                object.insert("id".to_string(), json!(row.id));
                object.insert(
                    alias.to_string(),
                    row.columns
                        .get(field)
                        .map_or(Value::Null, |text| Value::String(text.clone())),
                );
                Value::Object(object)
            })
            .collect();
        Ok(rows)
    }

    fn table(&self, name: &str) -> Result<Arc<Mutex<Table>>, StoreError> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchTable {
                table: name.to_string(),
            })
    }
}

fn unsupported(statement: &str) -> StoreError {
    StoreError::Unsupported {
        statement: statement.to_string(),
    }
}
