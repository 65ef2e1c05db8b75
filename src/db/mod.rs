//! Data-access capabilities consumed by the loaders.
//!
//! [`Executor`] covers parameterized statements and single-row queries.
//! [`BulkLoader`] covers the store's columnar fast path. Anything that loads
//! tables needs both, expressed as the [`Database`] bound, so the capability
//! is checked when the loader is built rather than on each call.

mod postgres;

pub use postgres::PgDatabase;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// A single bound parameter or bulk-load field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    BigInt(i64),
}

impl SqlValue {
    /// Renders the value the way a delimited bulk load expects it.
    pub fn to_field(&self) -> String {
        match self {
            SqlValue::Text(s) => s.clone(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::BigInt(v) => v.to_string(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

/// Statement execution against the relational store.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a parameterized statement and returns the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a statement expected to yield at most one row whose first column
    /// is a 64-bit identifier, e.g. `INSERT ... RETURNING id` or a lookup.
    async fn query_id(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>>;

    /// Releases the underlying connections.
    async fn close(&self) {}
}

/// Columnar bulk loading into a named table.
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Streams a delimited file whose first line is a header into `table`.
    async fn copy_from_file(&self, table: &str, columns: &[String], path: &Path) -> Result<u64>;

    /// Loads in-memory rows into `table`. Each row lines up with `columns`.
    async fn copy_rows(&self, table: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>)
    -> Result<u64>;
}

/// A handle that can both execute statements and bulk load.
pub trait Database: Executor + BulkLoader {}

impl<T: Executor + BulkLoader> Database for T {}

/// Quotes an identifier taken from untrusted input such as a file header.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the `COPY` statement for a delimited source.
pub fn build_copy_query(table: &str, columns: &[impl AsRef<str>], header: bool) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c.as_ref())).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER {})",
        table,
        quoted.join(", "),
        header
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("stop_id"), "\"stop_id\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_build_copy_query_with_header() {
        let query = build_copy_query("trips", &["route_id", "trip_id"], true);
        assert_eq!(
            query,
            "COPY trips (\"route_id\", \"trip_id\") FROM STDIN WITH (FORMAT csv, HEADER true)"
        );
    }

    #[test]
    fn test_sql_value_to_field() {
        assert_eq!(SqlValue::from("abc").to_field(), "abc");
        assert_eq!(SqlValue::from(7i32).to_field(), "7");
        assert_eq!(SqlValue::from(-3i64).to_field(), "-3");
    }
}
