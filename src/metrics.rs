//! Per-endpoint fetch instrumentation.
//!
//! The watcher records through [`FetchMetrics`]; exporting is left to
//! whatever recorder the embedding process installs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Recording interface for HTTP fetch timings, volume and failures.
pub trait FetchMetrics: Send + Sync {
    /// Time from issuing the GET until response headers arrived.
    fn observe_ttfb(&self, endpoint: &str, elapsed: Duration);

    /// Time spent reading the response body.
    fn observe_body_read(&self, endpoint: &str, elapsed: Duration);

    fn add_bytes(&self, endpoint: &str, bytes: u64);

    fn record_error(&self, endpoint: &str);
}

/// Forwards to the `metrics` facade so any installed recorder picks it up.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsFacade;

impl FetchMetrics for MetricsFacade {
    fn observe_ttfb(&self, endpoint: &str, elapsed: Duration) {
        metrics::histogram!("gtfs_http_ttfb_seconds", "endpoint" => endpoint.to_string())
            .record(elapsed.as_secs_f64());
    }

    fn observe_body_read(&self, endpoint: &str, elapsed: Duration) {
        metrics::histogram!("gtfs_http_read_body_seconds", "endpoint" => endpoint.to_string())
            .record(elapsed.as_secs_f64());
    }

    fn add_bytes(&self, endpoint: &str, bytes: u64) {
        metrics::counter!("gtfs_http_bytes_total", "endpoint" => endpoint.to_string())
            .increment(bytes);
    }

    fn record_error(&self, endpoint: &str) {
        metrics::counter!("gtfs_http_errors_total", "endpoint" => endpoint.to_string())
            .increment(1);
    }
}

/// Cumulative counters for one endpoint.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EndpointCounters {
    pub requests: u64,
    pub bytes: u64,
    pub errors: u64,
    pub last_ttfb: Option<Duration>,
    pub last_body_read: Option<Duration>,
}

/// In-process counter table, readable after the watcher stops.
#[derive(Debug, Default)]
pub struct EndpointStats {
    inner: Mutex<HashMap<String, EndpointCounters>>,
}

impl EndpointStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the counters for `endpoint`, if it was ever recorded.
    pub fn get(&self, endpoint: &str) -> Option<EndpointCounters> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(endpoint).cloned())
    }

    fn update(&self, endpoint: &str, f: impl FnOnce(&mut EndpointCounters)) {
        if let Ok(mut map) = self.inner.lock() {
            f(map.entry(endpoint.to_string()).or_default());
        }
    }
}

impl FetchMetrics for EndpointStats {
    fn observe_ttfb(&self, endpoint: &str, elapsed: Duration) {
        self.update(endpoint, |c| {
            c.requests += 1;
            c.last_ttfb = Some(elapsed);
        });
    }

    fn observe_body_read(&self, endpoint: &str, elapsed: Duration) {
        self.update(endpoint, |c| c.last_body_read = Some(elapsed));
    }

    fn add_bytes(&self, endpoint: &str, bytes: u64) {
        self.update(endpoint, |c| c.bytes += bytes);
    }

    fn record_error(&self, endpoint: &str) {
        self.update(endpoint, |c| c.errors += 1);
    }
}

impl<M: FetchMetrics + ?Sized> FetchMetrics for std::sync::Arc<M> {
    fn observe_ttfb(&self, endpoint: &str, elapsed: Duration) {
        (**self).observe_ttfb(endpoint, elapsed)
    }

    fn observe_body_read(&self, endpoint: &str, elapsed: Duration) {
        (**self).observe_body_read(endpoint, elapsed)
    }

    fn add_bytes(&self, endpoint: &str, bytes: u64) {
        (**self).add_bytes(endpoint, bytes)
    }

    fn record_error(&self, endpoint: &str) {
        (**self).record_error(endpoint)
    }
}

/// Records into both sinks.
impl<A: FetchMetrics, B: FetchMetrics> FetchMetrics for (A, B) {
    fn observe_ttfb(&self, endpoint: &str, elapsed: Duration) {
        self.0.observe_ttfb(endpoint, elapsed);
        self.1.observe_ttfb(endpoint, elapsed);
    }

    fn observe_body_read(&self, endpoint: &str, elapsed: Duration) {
        self.0.observe_body_read(endpoint, elapsed);
        self.1.observe_body_read(endpoint, elapsed);
    }

    fn add_bytes(&self, endpoint: &str, bytes: u64) {
        self.0.add_bytes(endpoint, bytes);
        self.1.add_bytes(endpoint, bytes);
    }

    fn record_error(&self, endpoint: &str) {
        self.0.record_error(endpoint);
        self.1.record_error(endpoint);
    }
}
