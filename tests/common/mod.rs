//! Shared fixtures: an in-memory store and bundle/feed builders.

#![allow(dead_code)]

use async_trait::async_trait;
use gtfs_ingest::db::{BulkLoader, Executor, SqlValue};
use gtfs_ingest::error::{IngestError, Result};
use gtfs_ingest::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
use gtfs_ingest::gtfs_rt::{FeedEntity, FeedMessage, TripDescriptor, TripUpdate};
use prost::Message;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use zip::write::SimpleFileOptions;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    feed_versions: Vec<(i64, String, String)>,
    snapshots: Vec<i64>,
    inserted: HashMap<String, Vec<Vec<SqlValue>>>,
    copied_files: HashMap<String, u64>,
    copied_rows: HashMap<String, Vec<Vec<SqlValue>>>,
    closed: bool,
}

/// Records every write the loaders issue.
#[derive(Debug, Default)]
pub struct FakeDb {
    state: Mutex<State>,
    fail_copy: AtomicBool,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later bulk load fail until reset.
    pub fn fail_copies(&self, fail: bool) {
        self.fail_copy.store(fail, Ordering::SeqCst);
    }

    pub fn feed_versions(&self) -> Vec<(i64, String, String)> {
        self.state.lock().unwrap().feed_versions.clone()
    }

    pub fn snapshots(&self) -> Vec<i64> {
        self.state.lock().unwrap().snapshots.clone()
    }

    /// Rows written to `table` by any path.
    pub fn row_count(&self, table: &str) -> u64 {
        let state = self.state.lock().unwrap();
        let inserted = state.inserted.get(table).map_or(0, |r| r.len() as u64);
        let files = state.copied_files.get(table).copied().unwrap_or(0);
        let rows = state.copied_rows.get(table).map_or(0, |r| r.len() as u64);
        inserted + files + rows
    }

    pub fn copied_rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.state
            .lock()
            .unwrap()
            .copied_rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Any write at all, ledger included.
    pub fn is_untouched(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.feed_versions.is_empty()
            && state.snapshots.is_empty()
            && state.inserted.is_empty()
            && state.copied_files.is_empty()
            && state.copied_rows.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn copy_failure(&self, table: &str) -> Result<()> {
        if self.fail_copy.load(Ordering::SeqCst) {
            return Err(IngestError::Database(sqlx::Error::Protocol(format!(
                "copy into {table} rejected"
            ))));
        }
        Ok(())
    }
}

fn text(params: &[SqlValue], i: usize) -> String {
    params.get(i).map(SqlValue::to_field).unwrap_or_default()
}

#[async_trait]
impl Executor for FakeDb {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let table = sql
            .strip_prefix("INSERT INTO ")
            .and_then(|rest| rest.split_whitespace().next())
            .ok_or_else(|| IngestError::Database(sqlx::Error::Protocol(sql.to_string())))?;
        let mut state = self.state.lock().unwrap();
        state
            .inserted
            .entry(table.to_string())
            .or_default()
            .push(params.to_vec());
        Ok(1)
    }

    async fn query_id(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        if sql.starts_with("SELECT feed_id FROM feed_version") {
            let digest = text(params, 0);
            return Ok(state
                .feed_versions
                .iter()
                .find(|(_, _, d)| *d == digest)
                .map(|(id, _, _)| *id));
        }

        state.next_id += 1;
        let id = state.next_id;
        if sql.starts_with("INSERT INTO feed_version ") {
            let row = (id, text(params, 0), text(params, 1));
            state.feed_versions.push(row);
        } else if sql.starts_with("INSERT INTO feed_snapshots ") {
            state.snapshots.push(id);
        } else {
            return Err(IngestError::Database(sqlx::Error::Protocol(sql.to_string())));
        }
        Ok(Some(id))
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[async_trait]
impl BulkLoader for FakeDb {
    async fn copy_from_file(&self, table: &str, _columns: &[String], path: &Path) -> Result<u64> {
        self.copy_failure(table)?;
        let mut reader = csv::ReaderBuilder::new().from_path(path)?;
        let rows = reader.records().count() as u64;
        *self
            .state
            .lock()
            .unwrap()
            .copied_files
            .entry(table.to_string())
            .or_default() += rows;
        Ok(rows)
    }

    async fn copy_rows(
        &self,
        table: &str,
        _columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        self.copy_failure(table)?;
        let n = rows.len() as u64;
        self.state
            .lock()
            .unwrap()
            .copied_rows
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        Ok(n)
    }
}

/// Required and optional files with a fixed number of data rows each.
pub fn sample_files(rows: usize) -> Vec<(String, String)> {
    let tables = [
        ("agency.txt", "agency_id,agency_name,agency_url,agency_timezone"),
        ("routes.txt", "route_id,agency_id,route_short_name,route_type"),
        ("trips.txt", "route_id,service_id,trip_id"),
        ("stops.txt", "stop_id,stop_name,stop_lat,stop_lon"),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence",
        ),
        (
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date",
        ),
        ("calendar_dates.txt", "service_id,date,exception_type"),
        ("shapes.txt", "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence"),
        ("transfers.txt", "from_stop_id,to_stop_id,transfer_type"),
    ];

    tables
        .iter()
        .map(|(name, header)| {
            let width = header.split(',').count();
            let mut body = format!("{header}\n");
            for r in 0..rows {
                let fields: Vec<String> = (0..width).map(|c| format!("v{r}_{c}")).collect();
                body.push_str(&fields.join(","));
                body.push('\n');
            }
            (name.to_string(), body)
        })
        .collect()
}

/// Writes `files` into a zip at a fresh temporary path.
pub fn write_bundle(files: &[(String, String)]) -> tempfile::NamedTempFile {
    let tmp = tempfile::Builder::new()
        .suffix(".zip")
        .tempfile()
        .unwrap();
    let mut writer = zip::ZipWriter::new(tmp.reopen().unwrap());
    for (name, body) in files {
        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    tmp
}

pub fn stop_time(stop_id: &str, arrival: Option<i64>, departure: Option<i64>) -> StopTimeUpdate {
    let event = |time| StopTimeEvent {
        time: Some(time),
        ..Default::default()
    };
    StopTimeUpdate {
        stop_id: Some(stop_id.to_string()),
        arrival: arrival.map(event),
        departure: departure.map(event),
        ..Default::default()
    }
}

pub fn trip_entity(trip_id: &str, stop_times: Vec<StopTimeUpdate>) -> FeedEntity {
    FeedEntity {
        id: format!("entity-{trip_id}"),
        trip_update: Some(TripUpdate {
            trip: Some(TripDescriptor {
                trip_id: Some(trip_id.to_string()),
                start_date: Some("20240301".to_string()),
                start_time: Some("07:30:00".to_string()),
                direction_id: Some(0),
                ..Default::default()
            }),
            stop_time_update: stop_times,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn encode_feed(entity: Vec<FeedEntity>) -> Vec<u8> {
    FeedMessage {
        entity,
        ..Default::default()
    }
    .encode_to_vec()
}
