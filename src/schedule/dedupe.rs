//! Content-hash deduplication against the `feed_version` ledger.

use crate::db::{Executor, SqlValue};
use crate::error::{IngestError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::debug;

const FIND_FEED_VERSION: &str = "SELECT feed_id FROM feed_version WHERE source_sha256 = $1";

const INSERT_FEED_VERSION: &str = "INSERT INTO feed_version (imported_at, source_url, source_sha256) \
     VALUES (NOW(), $1, $2) RETURNING feed_id";

/// Hex SHA-256 of everything `reader` yields.
pub fn compute_digest<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of the whole file at `path`.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let digest = compute_digest(&mut file)?;
    debug!(path = %path.display(), digest = %digest, "Computed bundle digest");
    Ok(digest)
}

/// Returns the id of the feed version already recorded for `digest`.
pub async fn find_feed_version<E: Executor + ?Sized>(db: &E, digest: &str) -> Result<Option<i64>> {
    db.query_id(FIND_FEED_VERSION, &[SqlValue::from(digest)]).await
}

/// Records a new feed version and returns its id.
pub async fn record_feed_version<E: Executor + ?Sized>(
    db: &E,
    source: &str,
    digest: &str,
) -> Result<i64> {
    let id = db
        .query_id(
            INSERT_FEED_VERSION,
            &[SqlValue::from(source), SqlValue::from(digest)],
        )
        .await?;

    id.ok_or_else(|| {
        IngestError::Database(sqlx::Error::Protocol(
            "feed_version insert returned no id".to_string(),
        ))
    })
}
