//! Static GTFS bundle ingestion.
//!
//! A run goes extract → validate → hash → ledger lookup → ledger insert →
//! table loads, stopping at the first failure. A bundle whose digest is
//! already in the ledger is a no-op reported as [`StaticOutcome::AlreadyIngested`].

pub mod archive;
pub mod dedupe;
pub mod loader;
pub mod tables;
pub mod validate;

use crate::config::{BundleSource, StaticConfig, StaticTarget};
use crate::db::{Database, Executor, PgDatabase};
use crate::error::Result;
use crate::fetch::{BasicClient, download_to_temp_file};
use archive::extract_bundle;
use dedupe::{file_digest, find_feed_version, record_feed_version};
use loader::{TableLoadReport, TableLoader, count_records};
use std::path::Path;
use tables::{GTFS_TABLES, LoadStrategy};
use tracing::info;
use validate::validate_bundle_dir;

/// How a static run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticOutcome {
    Ingested {
        feed_id: i64,
        digest: String,
        tables: Vec<TableLoadReport>,
    },
    /// The digest was already in the ledger; nothing was written.
    AlreadyIngested { feed_id: i64, digest: String },
    /// Nothing was written; `tables` holds the record counts that would load.
    DryRun {
        digest: String,
        tables: Vec<TableLoadReport>,
    },
}

impl StaticOutcome {
    pub fn digest(&self) -> &str {
        match self {
            StaticOutcome::Ingested { digest, .. }
            | StaticOutcome::AlreadyIngested { digest, .. }
            | StaticOutcome::DryRun { digest, .. } => digest,
        }
    }
}

/// Ingests the bundle at `zip_path` into `db`, recording `source` in the ledger.
///
/// The ledger row is committed before any table loads and is not rolled back
/// if a load fails. Until that row is deleted, later runs of the same bundle
/// return [`StaticOutcome::AlreadyIngested`] without loading anything.
#[tracing::instrument(skip(db, zip_path), fields(zip = %zip_path.display()))]
pub async fn ingest_bundle<D: Database + ?Sized>(
    db: &D,
    source: &str,
    zip_path: &Path,
) -> Result<StaticOutcome> {
    let digest = file_digest(zip_path)?;
    let workdir = extract_bundle(zip_path)?;
    validate_bundle_dir(workdir.path())?;

    if let Some(feed_id) = find_feed_version(db, &digest).await? {
        info!(feed_id, digest = %digest, "Skipped, already ingested");
        return Ok(StaticOutcome::AlreadyIngested { feed_id, digest });
    }

    let feed_id = record_feed_version(db, source, &digest).await?;
    info!(feed_id, digest = %digest, "Recorded feed version");

    let tables = TableLoader::new(db).load_all(workdir.path()).await?;
    let total: u64 = tables.iter().map(|t| t.rows).sum();
    info!(feed_id, rows = total, "Bundle ingested");

    Ok(StaticOutcome::Ingested {
        feed_id,
        digest,
        tables,
    })
}

/// Extracts, validates and hashes the bundle, then counts the records each
/// table would receive. Tables without a loader report zero.
pub fn inspect_bundle(zip_path: &Path) -> Result<StaticOutcome> {
    let digest = file_digest(zip_path)?;
    let workdir = extract_bundle(zip_path)?;
    validate_bundle_dir(workdir.path())?;

    let mut tables = Vec::with_capacity(GTFS_TABLES.len());
    for table in GTFS_TABLES {
        let path = workdir.path().join(table.file_name);
        let rows = if table.strategy == LoadStrategy::Skip || !path.exists() {
            0
        } else {
            count_records(&path)?
        };
        info!(table = table.table_name, rows, "Would load");
        tables.push(TableLoadReport {
            table: table.table_name,
            strategy: table.strategy,
            rows,
        });
    }

    Ok(StaticOutcome::DryRun { digest, tables })
}

/// Runs one static ingest as configured, downloading the bundle first when
/// the source is a URL.
pub async fn run_static(config: &StaticConfig) -> Result<StaticOutcome> {
    // A downloaded bundle stays on disk until `_download` drops at the end of the run.
    let (zip_path, _download) = match &config.source {
        BundleSource::Path(path) => (path.clone(), None),
        BundleSource::Url(url) => {
            let client = BasicClient::new();
            let tmp = download_to_temp_file(&client, url).await?;
            (tmp.to_path_buf(), Some(tmp))
        }
    };

    match &config.target {
        StaticTarget::DryRun => inspect_bundle(&zip_path),
        StaticTarget::Database(url) => {
            let db = PgDatabase::connect(url).await?;
            let outcome = ingest_bundle(&db, &config.source.locator(), &zip_path).await;
            db.close().await;
            outcome
        }
    }
}
