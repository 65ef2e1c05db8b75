//! HTTP retrieval for both feed kinds.
//!
//! [`download_to_temp_file`] is the one-shot path used for static bundles.
//! [`fetch_instrumented`] is the polling path used by the watcher; it records
//! timings, volume and failures per endpoint.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::{IngestError, Result};
use crate::metrics::FetchMetrics;
use reqwest::{Method, Request, Response};
use std::time::Instant;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Upper bound on body pre-allocation taken from `Content-Length`.
const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

fn build_get(url: &str) -> Result<Request> {
    let parsed = url
        .parse()
        .map_err(|_| IngestError::InvalidUrl(url.to_string()))?;
    Ok(Request::new(Method::GET, parsed))
}

fn check_status(url: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        return Err(IngestError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(resp)
}

async fn read_body(resp: &mut Response) -> Result<Vec<u8>> {
    let capacity = resp.content_length().unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize;
    let mut body = Vec::with_capacity(capacity);
    while let Some(chunk) = resp.chunk().await? {
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Fetches `url`, recording time-to-first-byte, body-read time and bytes
/// on success, or one error on any failure.
pub async fn fetch_instrumented<C, M>(client: &C, url: &str, metrics: &M) -> Result<Vec<u8>>
where
    C: HttpClient,
    M: FetchMetrics + ?Sized,
{
    let result: Result<Vec<u8>> = async {
        let request = build_get(url)?;
        let start = Instant::now();
        let resp = client.execute(request).await?;
        metrics.observe_ttfb(url, start.elapsed());

        let mut resp = check_status(url, resp)?;

        let body_start = Instant::now();
        let body = read_body(&mut resp).await?;
        metrics.observe_body_read(url, body_start.elapsed());
        metrics.add_bytes(url, body.len() as u64);

        debug!(url, bytes = body.len(), "Feed bytes received");
        Ok(body)
    }
    .await;

    if result.is_err() {
        metrics.record_error(url);
    }
    result
}

/// Streams `url` into a fresh `gtfs-ingest-*.zip` temporary file.
///
/// The file is deleted if any step fails, and again when the returned
/// [`TempPath`] is dropped.
#[tracing::instrument(skip(client))]
pub async fn download_to_temp_file<C: HttpClient>(client: &C, url: &str) -> Result<TempPath> {
    let request = build_get(url)?;
    let (file, path) = tempfile::Builder::new()
        .prefix("gtfs-ingest-")
        .suffix(".zip")
        .tempfile()?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let resp = client.execute(request).await?;
    let mut resp = check_status(url, resp)?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    info!(url, path = %path.display(), bytes = written, "Downloaded bundle");
    Ok(path)
}
