//! GTFS-realtime trip update watcher.

pub mod batch;
pub mod events;
pub mod watcher;

use crate::config::RealtimeConfig;
use crate::db::PgDatabase;
use crate::error::Result;
use crate::fetch::BasicClient;
use crate::metrics::{EndpointStats, MetricsFacade};
use events::{IntervalEvents, StopCause};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use watcher::Watcher;

/// Connects to the store and polls the configured endpoints until `cancel`
/// fires or the configured cycle count runs out.
pub async fn run_realtime(config: &RealtimeConfig, cancel: CancellationToken) -> Result<StopCause> {
    let db = PgDatabase::connect(&config.database).await?;
    let client = BasicClient::with_timeout(config.request_timeout)?;
    let stats = Arc::new(EndpointStats::new());

    let mut watcher = Watcher::new(
        db,
        client,
        (MetricsFacade, Arc::clone(&stats)),
        config.urls.clone(),
    );
    let mut events = IntervalEvents::new(config.interval, cancel, config.max_cycles);
    let cause = watcher.watch(&mut events).await?;

    for url in &config.urls {
        if let Some(counters) = stats.get(url) {
            info!(
                url = %url,
                requests = counters.requests,
                bytes = counters.bytes,
                errors = counters.errors,
                "Endpoint totals"
            );
        }
    }

    Ok(cause)
}
