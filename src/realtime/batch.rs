//! Per-snapshot row buffers.

use crate::db::SqlValue;
use crate::error::IngestError;
use crate::gtfs_rt::{FeedEntity, FeedMessage, TripUpdate};
use tracing::warn;

pub const TRIP_UPDATE_TABLE: &str = "trip_update_events";
pub const TRIP_UPDATE_COLUMNS: &[&str] = &[
    "trip_id",
    "start_date",
    "start_time",
    "direction_id",
    "snapshot_id",
];

pub const STOP_TIME_UPDATE_TABLE: &str = "trip_update_stop_time_events";
pub const STOP_TIME_UPDATE_COLUMNS: &[&str] =
    &["stop_id", "arrival_time", "departure_time", "snapshot_id"];

/// Initial capacity per buffer, sized for a mid-size agency feed.
pub const TRIP_UPDATE_CAPACITY: usize = 2_000;
pub const STOP_TIME_UPDATE_CAPACITY: usize = 40_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripUpdateRow {
    pub trip_id: String,
    pub start_date: String,
    pub start_time: String,
    pub direction_id: i32,
    pub snapshot_id: i64,
}

impl TripUpdateRow {
    fn into_values(self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.trip_id),
            SqlValue::Text(self.start_date),
            SqlValue::Text(self.start_time),
            SqlValue::Int(self.direction_id),
            SqlValue::BigInt(self.snapshot_id),
        ]
    }
}

/// A stop-level update. Missing arrival or departure times are stored as 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTimeUpdateRow {
    pub stop_id: String,
    pub arrival: i64,
    pub departure: i64,
    pub snapshot_id: i64,
}

impl StopTimeUpdateRow {
    fn into_values(self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.stop_id),
            SqlValue::BigInt(self.arrival),
            SqlValue::BigInt(self.departure),
            SqlValue::BigInt(self.snapshot_id),
        ]
    }
}

/// Counts for one batched feed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub entities: usize,
    pub trip_updates: usize,
    pub stop_time_updates: usize,
    pub failed_trip_updates: usize,
}

/// Rows waiting to be flushed, one growable buffer per table.
#[derive(Debug, Default)]
pub struct SnapshotBuffers {
    pub trip_updates: Vec<TripUpdateRow>,
    pub stop_time_updates: Vec<StopTimeUpdateRow>,
}

impl SnapshotBuffers {
    pub fn new() -> Self {
        Self::with_capacity(TRIP_UPDATE_CAPACITY, STOP_TIME_UPDATE_CAPACITY)
    }

    pub fn with_capacity(trip_updates: usize, stop_time_updates: usize) -> Self {
        Self {
            trip_updates: Vec::with_capacity(trip_updates),
            stop_time_updates: Vec::with_capacity(stop_time_updates),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trip_updates.is_empty() && self.stop_time_updates.is_empty()
    }

    /// Buffers every trip update of `feed` under `snapshot_id`.
    ///
    /// Entities without a trip update are ignored. A trip update without a
    /// trip descriptor is logged and counted as failed; the rest of the feed
    /// is still batched.
    pub fn add_feed(&mut self, feed: &FeedMessage, snapshot_id: i64) -> BatchSummary {
        let mut summary = BatchSummary {
            entities: feed.entity.len(),
            ..Default::default()
        };

        for entity in &feed.entity {
            let Some(trip_update) = &entity.trip_update else {
                continue;
            };
            match self.add_trip_update(entity, trip_update, snapshot_id) {
                Ok(stop_times) => {
                    summary.trip_updates += 1;
                    summary.stop_time_updates += stop_times;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping trip update");
                    summary.failed_trip_updates += 1;
                }
            }
        }

        summary
    }

    fn add_trip_update(
        &mut self,
        entity: &FeedEntity,
        trip_update: &TripUpdate,
        snapshot_id: i64,
    ) -> Result<usize, IngestError> {
        let trip = trip_update
            .trip
            .as_ref()
            .ok_or_else(|| IngestError::MissingTripDescriptor(entity.id.clone()))?;

        self.trip_updates.push(TripUpdateRow {
            trip_id: trip.trip_id().to_string(),
            start_date: trip.start_date().to_string(),
            start_time: trip.start_time().to_string(),
            // Out-of-range values are stored like a missing direction.
            direction_id: i32::try_from(trip.direction_id()).unwrap_or_default(),
            snapshot_id,
        });

        for stu in &trip_update.stop_time_update {
            self.stop_time_updates.push(StopTimeUpdateRow {
                stop_id: stu.stop_id().to_string(),
                arrival: stu.arrival.as_ref().and_then(|e| e.time).unwrap_or(0),
                departure: stu.departure.as_ref().and_then(|e| e.time).unwrap_or(0),
                snapshot_id,
            });
        }

        Ok(trip_update.stop_time_update.len())
    }

    /// Bulk-load rows for the trip update table.
    pub fn trip_update_rows(&self) -> Vec<Vec<SqlValue>> {
        self.trip_updates
            .iter()
            .cloned()
            .map(TripUpdateRow::into_values)
            .collect()
    }

    /// Bulk-load rows for the stop-time update table.
    pub fn stop_time_update_rows(&self) -> Vec<Vec<SqlValue>> {
        self.stop_time_updates
            .iter()
            .cloned()
            .map(StopTimeUpdateRow::into_values)
            .collect()
    }
}
