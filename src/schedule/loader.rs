//! Delimited-file loading into the store.
//!
//! Every table goes through [`TableLoader::load_table`], which picks the path
//! from the table's [`LoadStrategy`]. Column names always come from the
//! file's own header line.

use crate::db::{Database, SqlValue, quote_ident};
use crate::error::{IngestError, Result};
use crate::schedule::tables::{GTFS_TABLES, GtfsTable, LoadStrategy};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, info};

const UTF8_BOM: char = '\u{feff}';

/// Outcome of loading one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoadReport {
    pub table: &'static str,
    pub strategy: LoadStrategy,
    pub rows: u64,
}

/// A parsed delimited file: its header and every data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Records {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn header_from(record: &StringRecord) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == 0 {
                field.trim_start_matches(UTF8_BOM).to_string()
            } else {
                field.to_string()
            }
        })
        .collect()
}

fn reader_for(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

/// Reads only the header line of `path`.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = reader_for(path)?;
    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(IngestError::EmptyTable(file_label(path)));
    }
    Ok(header_from(&record))
}

/// Reads the whole file, rejecting any row whose field count differs from
/// the header's.
pub fn read_records(path: &Path) -> Result<Records> {
    let mut reader = reader_for(path)?;
    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(IngestError::EmptyTable(file_label(path)));
    }
    let columns = header_from(&record);

    let mut rows = Vec::new();
    while reader.read_record(&mut record)? {
        if record.len() != columns.len() {
            return Err(IngestError::FieldCountMismatch {
                file: file_label(path),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: columns.len(),
                found: record.len(),
            });
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Records { columns, rows })
}

/// Counts data rows without loading anything.
pub fn count_records(path: &Path) -> Result<u64> {
    let mut reader = reader_for(path)?;
    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Ok(0);
    }

    let mut count = 0;
    while reader.read_record(&mut record)? {
        count += 1;
    }
    Ok(count)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builds a row insert whose parameters are all text.
///
/// The row goes through `json_populate_record` so each value is converted
/// with the destination column's own input function, the same as a COPY.
pub fn build_insert(table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let pairs: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}, ${}::text", quote_literal(c), i + 1))
        .collect();
    format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM json_populate_record(NULL::{table}, json_build_object({pairs}))",
        cols = quoted.join(", "),
        pairs = pairs.join(", ")
    )
}

/// Loads GTFS tables through a handle that can both insert and bulk load.
pub struct TableLoader<'a, D: Database + ?Sized> {
    db: &'a D,
}

impl<'a, D: Database + ?Sized> TableLoader<'a, D> {
    pub fn new(db: &'a D) -> Self {
        Self { db }
    }

    /// Loads every table of [`GTFS_TABLES`] from `dir`, in order, stopping at
    /// the first failure.
    pub async fn load_all(&self, dir: &Path) -> Result<Vec<TableLoadReport>> {
        let mut reports = Vec::with_capacity(GTFS_TABLES.len());
        for table in GTFS_TABLES {
            reports.push(self.load_table(table, dir).await?);
        }
        Ok(reports)
    }

    #[tracing::instrument(skip(self, table, dir), fields(table = table.table_name))]
    pub async fn load_table(&self, table: &GtfsTable, dir: &Path) -> Result<TableLoadReport> {
        let path = dir.join(table.file_name);

        let rows = if table.strategy == LoadStrategy::Skip {
            debug!("No loader assigned, skipping");
            0
        } else if !table.required && !path.exists() {
            debug!("Optional file absent, skipping");
            0
        } else {
            match table.strategy {
                LoadStrategy::RowInsert => self.insert_rows(table.table_name, &path).await?,
                LoadStrategy::Bulk => self.bulk_load(table.table_name, &path).await?,
                LoadStrategy::Skip => 0,
            }
        };

        info!(rows, strategy = ?table.strategy, "Loaded table");
        Ok(TableLoadReport {
            table: table.table_name,
            strategy: table.strategy,
            rows,
        })
    }

    async fn insert_rows(&self, table: &str, path: &Path) -> Result<u64> {
        let records = read_records(path)?;
        let statement = build_insert(table, &records.columns);

        let mut inserted = 0;
        for row in records.rows {
            let params: Vec<SqlValue> = row.into_iter().map(SqlValue::Text).collect();
            inserted += self.db.execute(&statement, &params).await?;
        }
        Ok(inserted)
    }

    async fn bulk_load(&self, table: &str, path: &Path) -> Result<u64> {
        let columns = read_header(path)?;
        self.db.copy_from_file(table, &columns, path).await
    }
}
