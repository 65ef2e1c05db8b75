//! The polling loop.
//!
//! [`Watcher::watch`] waits on an [`EventSource`]. Each tick samples every
//! endpoint in configured order: fetch, decode, record a snapshot, batch,
//! flush. Fetch and decode failures cost that endpoint its cycle and nothing
//! else. Store failures end the loop.

use crate::db::Database;
use crate::error::{IngestError, Result};
use crate::fetch::{HttpClient, fetch_instrumented};
use crate::metrics::FetchMetrics;
use crate::parser::parse_feed;
use crate::realtime::batch::{
    BatchSummary, STOP_TIME_UPDATE_COLUMNS, STOP_TIME_UPDATE_TABLE, SnapshotBuffers,
    TRIP_UPDATE_COLUMNS, TRIP_UPDATE_TABLE,
};
use crate::realtime::events::{EventSource, StopCause, WatchEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INSERT_SNAPSHOT: &str = "INSERT INTO feed_snapshots DEFAULT VALUES RETURNING snapshot_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Sampling,
    Stopped,
}

/// What happened to one endpoint in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOutcome {
    Flushed {
        snapshot_id: i64,
        summary: BatchSummary,
    },
    /// Fetch or decode failed; nothing was written for this endpoint.
    Failed,
    Cancelled,
}

pub struct Watcher<D, C, M> {
    db: D,
    client: C,
    metrics: M,
    urls: Vec<String>,
    buffers: SnapshotBuffers,
    state: WatchState,
    cycles: u64,
}

impl<D, C, M> Watcher<D, C, M>
where
    D: Database,
    C: HttpClient,
    M: FetchMetrics,
{
    pub fn new(db: D, client: C, metrics: M, urls: Vec<String>) -> Self {
        Self {
            db,
            client,
            metrics,
            urls,
            buffers: SnapshotBuffers::new(),
            state: WatchState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Completed sampling cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Rows batched but not yet flushed. Non-empty only after a failed flush.
    pub fn pending(&self) -> &SnapshotBuffers {
        &self.buffers
    }

    #[doc(hidden)]
    pub fn db(&self) -> &D {
        &self.db
    }

    #[doc(hidden)]
    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    /// Runs until `events` stops or a store write fails, then closes the
    /// store handle.
    pub async fn watch<E: EventSource>(&mut self, events: &mut E) -> Result<StopCause> {
        let cancel = events.cancellation();
        info!(endpoints = self.urls.len(), "Watching real-time feeds");

        let result = loop {
            match events.next_event().await {
                WatchEvent::Stop(cause) => break Ok(cause),
                WatchEvent::Tick => {
                    self.state = WatchState::Sampling;
                    match self.run_cycle(&cancel).await {
                        Ok(None) => self.state = WatchState::Idle,
                        Ok(Some(cause)) => break Ok(cause),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        self.state = WatchState::Stopped;
        self.db.close().await;

        match &result {
            Ok(cause) => info!(?cause, cycles = self.cycles, "Watcher stopped"),
            Err(e) => error!(error = %e, cycles = self.cycles, "Watcher failed"),
        }
        result
    }

    /// Samples every endpoint once. Returns a stop cause when cancellation
    /// arrived mid-cycle.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<Option<StopCause>> {
        self.cycles += 1;
        debug!(cycle = self.cycles, "Starting sample cycle");

        for i in 0..self.urls.len() {
            if cancel.is_cancelled() {
                return Ok(Some(StopCause::Signal));
            }
            let url = self.urls[i].clone();
            if self.sample_endpoint(&url, cancel).await? == EndpointOutcome::Cancelled {
                return Ok(Some(StopCause::Signal));
            }
        }

        Ok(None)
    }

    #[tracing::instrument(skip(self, cancel), fields(cycle = self.cycles))]
    pub async fn sample_endpoint(
        &mut self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<EndpointOutcome> {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Ok(EndpointOutcome::Cancelled),
            fetched = fetch_instrumented(&self.client, url, &self.metrics) => fetched,
        };

        let feed = match fetched.and_then(|bytes| parse_feed(&bytes)) {
            Ok(feed) => feed,
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Endpoint skipped this cycle");
                return Ok(EndpointOutcome::Failed);
            }
        };

        let snapshot_id = self.ingest_snapshot().await?;
        let summary = self.buffers.add_feed(&feed, snapshot_id);
        self.flush().await?;

        info!(
            snapshot_id,
            entities = summary.entities,
            trip_updates = summary.trip_updates,
            stop_time_updates = summary.stop_time_updates,
            failed_trip_updates = summary.failed_trip_updates,
            "Processed {} trip updates and {} stop time updates",
            summary.trip_updates,
            summary.stop_time_updates,
        );

        Ok(EndpointOutcome::Flushed {
            snapshot_id,
            summary,
        })
    }

    async fn ingest_snapshot(&self) -> Result<i64> {
        self.db.query_id(INSERT_SNAPSHOT, &[]).await?.ok_or_else(|| {
            IngestError::Database(sqlx::Error::Protocol(
                "feed_snapshots insert returned no id".to_string(),
            ))
        })
    }

    /// Bulk loads the buffered rows, trip updates first, and swaps in fresh
    /// buffers. On failure the buffers are left exactly as they were.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffers.is_empty() {
            return Ok(());
        }

        let trips = self
            .db
            .copy_rows(
                TRIP_UPDATE_TABLE,
                TRIP_UPDATE_COLUMNS,
                self.buffers.trip_update_rows(),
            )
            .await?;
        let stop_times = self
            .db
            .copy_rows(
                STOP_TIME_UPDATE_TABLE,
                STOP_TIME_UPDATE_COLUMNS,
                self.buffers.stop_time_update_rows(),
            )
            .await?;

        let flushed = std::mem::replace(&mut self.buffers, SnapshotBuffers::new());
        debug!(
            trips,
            stop_times,
            buffered = flushed.trip_updates.len() + flushed.stop_time_updates.len(),
            "Flushed snapshot buffers"
        );
        Ok(())
    }
}
