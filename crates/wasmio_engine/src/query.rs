//! Tagged queries.
//!
//! The host sends a query as `{ "_tag": "insert" | "select", "value": { .. } }`.
//! Decoding is strict: an unknown or missing tag and a missing field all
//! fail, and textual input reports the 1-based line and column.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use wasmio_core::Raised;

/// A decoded query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_tag", content = "value", rename_all = "camelCase")]
pub enum Query {
    /// Write one row
    Insert(InsertQuery),
    /// Read every row of a table
    Select(SelectQuery),
}

/// Insert payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertQuery {
    /// Target table
    pub table: String,
    /// Column that stores the JSON document
    pub field: String,
    /// Document to store
    pub data: Map<String, Value>,
}

/// Select payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Source table
    pub table: String,
    /// Column that stores the JSON document
    pub field: String,
}

impl Query {
    /// Decode a query from a host value
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] if the tag or a required field is
    /// missing or has the wrong type
    pub fn from_value(value: Value) -> Result<Self, QueryError> {
        serde_json::from_value(value).map_err(QueryError::Decode)
    }

    /// Tag of this query
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Select(_) => "select",
        }
    }

    /// Name of the driver primitive this query runs on
    #[must_use]
    pub fn primitive(&self) -> &'static str {
        match self {
            Self::Insert(_) => "execute_raw",
            Self::Select(_) => "query_raw",
        }
    }

    /// Render the statement handed to the driver
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Insert(insert) => insert.to_sql(),
            Self::Select(select) => select.to_sql(),
        }
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(input).map_err(QueryError::Decode)
    }
}

impl InsertQuery {
    /// Create an insert
    #[must_use]
    pub fn new(table: impl Into<String>, field: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            data,
        }
    }

    /// `INSERT INTO <table> (<field>) VALUES (json('<data>'))`
    #[must_use]
    pub fn to_sql(&self) -> String {
        let document = Value::Object(self.data.clone()).to_string();
        format!(
            "INSERT INTO {} ({}) VALUES (json('{}'))",
            self.table,
            self.field,
            document.replace('\'', "''")
        )
    }
}

impl SelectQuery {
    /// Create a select
    #[must_use]
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
        }
    }

    /// `SELECT "id", json("<field>") as "<field>" FROM "<table>" ORDER BY "id" DESC`
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!(
            r#"SELECT "id", json("{field}") as "{field}" FROM "{table}" ORDER BY "id" DESC"#,
            field = self.field,
            table = self.table
        )
    }
}

/// Result of a query, as the host receives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// Insert result, `{ "rowsImpacted": n }`
    Insert {
        /// Rows written
        #[serde(rename = "rowsImpacted")]
        rows_impacted: u64,
    },
    /// Rows, in the order the driver returned them
    Select(Vec<Value>),
}

impl QueryOutput {
    /// Rows of a select; empty for an insert
    #[must_use]
    pub fn rows(&self) -> &[Value] {
        match self {
            Self::Select(rows) => rows,
            Self::Insert { .. } => &[],
        }
    }

    /// Convert into a host value
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Insert { rows_impacted } => serde_json::json!({ "rowsImpacted": rows_impacted }),
            Self::Select(rows) => Value::Array(rows),
        }
    }
}

/// What `execute_raw` may answer with
#[derive(Deserialize)]
#[serde(untagged)]
enum ExecuteReply {
    Count(u64),
    Object {
        #[serde(rename = "rowsImpacted")]
        rows_impacted: u64,
    },
}

impl QueryOutput {
    /// Interpret a driver reply for `query`
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Reply`] if the reply has the wrong shape
    pub fn from_reply(query: &Query, reply: Value) -> Result<Self, QueryError> {
        let primitive = query.primitive();
        let reply_error = |source| QueryError::Reply { primitive, source };
        match query {
            Query::Insert(_) => {
                let rows_impacted = match serde_json::from_value(reply).map_err(reply_error)? {
                    ExecuteReply::Count(n) => n,
                    ExecuteReply::Object { rows_impacted } => rows_impacted,
                };
                Ok(Self::Insert { rows_impacted })
            }
            Query::Select(_) => Ok(Self::Select(
                serde_json::from_value(reply).map_err(reply_error)?,
            )),
        }
    }
}

/// Query errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query could not be decoded
    #[error("{0}")]
    Decode(serde_json::Error),

    /// The driver answered with something this query cannot use
    #[error("unexpected reply from {primitive}: {source}")]
    Reply {
        /// Primitive that answered
        primitive: &'static str,
        /// Decoder error
        source: serde_json::Error,
    },
}

impl From<QueryError> for Raised {
    fn from(err: QueryError) -> Self {
        Raised::from_error(&err)
    }
}
