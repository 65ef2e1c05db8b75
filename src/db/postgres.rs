use super::{BulkLoader, Executor, SqlValue, build_copy_query};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use csv::{QuoteStyle, WriterBuilder};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgCopyIn, PgPool, PgPoolCopyExt, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Postgres-backed store handle. Statements go through the pool; bulk loads
/// use `COPY ... FROM STDIN` on a pooled connection.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connects and verifies the store is reachable within a bounded wait.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Database connection established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::BigInt(v) => query.bind(*v),
        };
    }
    query
}

async fn stream_file(copy: &mut PgCopyIn<PoolConnection<Postgres>>, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; COPY_CHUNK_BYTES];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        copy.send(&buf[..n]).await?;
    }

    Ok(())
}

fn encode_rows(rows: &[Vec<SqlValue>]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(row.iter().map(SqlValue::to_field))?;
    }

    writer
        .into_inner()
        .map_err(|e| IngestError::Io(e.into_error()))
}

#[async_trait]
impl Executor for PgDatabase {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query_id(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>> {
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<i64, _>(0)?)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}

#[async_trait]
impl BulkLoader for PgDatabase {
    async fn copy_from_file(&self, table: &str, columns: &[String], path: &Path) -> Result<u64> {
        let statement = build_copy_query(table, columns, true);
        debug!(table, path = %path.display(), "Starting COPY from file");

        let mut copy = self.pool.copy_in_raw(&statement).await?;
        if let Err(e) = stream_file(&mut copy, path).await {
            let _ = copy.abort(e.to_string()).await;
            return Err(e);
        }

        Ok(copy.finish().await?)
    }

    async fn copy_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let payload = encode_rows(&rows)?;
        let statement = build_copy_query(table, columns, false);
        debug!(table, rows = rows.len(), bytes = payload.len(), "Starting COPY from rows");

        let mut copy = self.pool.copy_in_raw(&statement).await?;
        let sent = copy.send(payload).await.map(|_| ());
        if let Err(e) = sent {
            let _ = copy.abort(e.to_string()).await;
            return Err(IngestError::Database(e));
        }

        Ok(copy.finish().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rows_quotes_text_and_keeps_numbers_bare() {
        let rows = vec![vec![
            SqlValue::from("A1"),
            SqlValue::from(""),
            SqlValue::from(0i64),
        ]];
        let encoded = String::from_utf8(encode_rows(&rows).unwrap()).unwrap();
        assert_eq!(encoded, "\"A1\",\"\",0\n");
    }

    #[test]
    fn test_encode_rows_escapes_embedded_quotes() {
        let rows = vec![vec![SqlValue::from("say \"hi\""), SqlValue::from(3i32)]];
        let encoded = String::from_utf8(encode_rows(&rows).unwrap()).unwrap();
        assert_eq!(encoded, "\"say \"\"hi\"\"\",3\n");
    }
}
