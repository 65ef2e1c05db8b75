//! CLI entry point for the GTFS ingest tool.
//!
//! `static` loads a schedule bundle into the store once; `realtime` polls
//! GTFS-RT trip update feeds until interrupted.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gtfs_ingest::config::{RealtimeOptions, StaticOptions};
use gtfs_ingest::realtime::run_realtime;
use gtfs_ingest::schedule::{StaticOutcome, run_static};
use std::ffi::OsStr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_ingest", version)]
#[command(about = "Load GTFS schedules and GTFS-RT trip updates into Postgres", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a static GTFS bundle from a zip file or URL
    Static(StaticOptions),
    /// Poll GTFS-RT endpoints and record trip updates
    Realtime(RealtimeOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Static(options) => {
            let config = options.resolve()?;
            match run_static(&config).await? {
                StaticOutcome::Ingested {
                    feed_id, tables, ..
                } => {
                    let rows: u64 = tables.iter().map(|t| t.rows).sum();
                    info!(feed_id, tables = tables.len(), rows, "Static ingest complete");
                }
                StaticOutcome::AlreadyIngested { feed_id, digest } => {
                    info!(feed_id, digest = %digest, "Skipped, already ingested");
                }
                StaticOutcome::DryRun { digest, tables } => {
                    for t in &tables {
                        info!(table = t.table, rows = t.rows, strategy = ?t.strategy, "Dry run");
                    }
                    info!(digest = %digest, "Dry run complete, nothing written");
                }
            }
        }
        Commands::Realtime(options) => {
            let config = options.resolve()?;
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));

            let cause = run_realtime(&config, cancel).await?;
            info!(?cause, "Real-time watcher exited");
        }
    }

    Ok(())
}

/// Cancels `token` on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
        _ = terminate => {}
    }

    info!("Shutdown requested");
    token.cancel();
}
