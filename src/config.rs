//! Startup configuration for both loaders.
//!
//! Options arrive from the command line, optionally overridden by a TOML
//! file, and are validated into [`StaticConfig`] / [`RealtimeConfig`] before
//! any network or store I/O happens.

use crate::error::{IngestError, Result};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a static bundle comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    Path(PathBuf),
    Url(String),
}

impl BundleSource {
    /// The locator recorded in the feed-version ledger.
    pub fn locator(&self) -> String {
        match self {
            BundleSource::Path(p) => p.display().to_string(),
            BundleSource::Url(u) => u.clone(),
        }
    }
}

/// Where a static run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticTarget {
    Database(String),
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticConfig {
    pub source: BundleSource,
    pub target: StaticTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub urls: Vec<String>,
    pub database: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    /// Number of ticks before the watcher stops on its own; `None` runs until cancelled.
    pub max_cycles: Option<usize>,
}

/// Static loader options as given on the command line.
#[derive(Debug, Clone, Default, Args)]
pub struct StaticOptions {
    /// Path to a GTFS zip for offline ingest
    #[arg(long)]
    pub zip: Option<PathBuf>,

    /// URL of a GTFS zip for online ingest
    #[arg(long)]
    pub url: Option<String>,

    /// Target database connection string
    #[arg(long)]
    pub database: Option<String>,

    /// Show what would be ingested without writing to the database
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Read the source URL and database from this TOML file instead
    #[arg(long, value_name = "FILE")]
    pub toml: Option<PathBuf>,
}

/// Real-time watcher options as given on the command line.
#[derive(Debug, Clone, Args)]
pub struct RealtimeOptions {
    /// GTFS-RT endpoint to poll (repeatable)
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Target database connection string
    #[arg(long)]
    pub database: Option<String>,

    /// Seconds between polling cycles
    #[arg(long, default_value_t = 30)]
    pub interval_secs: u64,

    /// Per-request deadline in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Stop after this many cycles (0 = run until interrupted)
    #[arg(long, default_value_t = 0)]
    pub max_cycles: usize,

    /// Read endpoints and database from this TOML file instead
    #[arg(long, value_name = "FILE")]
    pub toml: Option<PathBuf>,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            database: None,
            interval_secs: 30,
            timeout_secs: 10,
            max_cycles: 0,
            toml: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StaticFile {
    default_url: Option<String>,
    default_database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RealtimeFile {
    #[serde(default)]
    urls: Vec<String>,
    database: Option<String>,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    max_cycles: Option<usize>,
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(toml::from_str(&content)?)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StaticOptions {
    /// Applies the TOML file (if any) and validates the result.
    pub fn resolve(mut self) -> Result<StaticConfig> {
        if let Some(path) = self.toml.take() {
            let file: StaticFile = read_toml(&path)?;
            self.url = file.default_url;
            self.database = file.default_database;
        }
        StaticConfig::validate(self)
    }
}

impl StaticConfig {
    /// Exactly one of zip/url and exactly one of database/dry-run.
    pub fn validate(options: StaticOptions) -> Result<Self> {
        let url = non_empty(options.url);
        let source = match (options.zip, url) {
            (Some(zip), None) => BundleSource::Path(zip),
            (None, Some(url)) => BundleSource::Url(url),
            _ => {
                return Err(IngestError::Config(
                    "exactly one of --zip or --url must be specified".to_string(),
                ));
            }
        };

        let target = match (non_empty(options.database), options.dry_run) {
            (Some(db), false) => StaticTarget::Database(db),
            (None, true) => StaticTarget::DryRun,
            _ => {
                return Err(IngestError::Config(
                    "exactly one of --dry-run or --database must be specified".to_string(),
                ));
            }
        };

        Ok(Self { source, target })
    }
}

impl RealtimeOptions {
    /// Applies the TOML file (if any) and validates the result.
    pub fn resolve(mut self) -> Result<RealtimeConfig> {
        if let Some(path) = self.toml.take() {
            let file: RealtimeFile = read_toml(&path)?;
            self.urls = file.urls;
            self.database = file.database;
            if let Some(v) = file.interval_secs {
                self.interval_secs = v;
            }
            if let Some(v) = file.timeout_secs {
                self.timeout_secs = v;
            }
            if let Some(v) = file.max_cycles {
                self.max_cycles = v;
            }
        }
        RealtimeConfig::validate(self)
    }
}

impl RealtimeConfig {
    pub fn validate(options: RealtimeOptions) -> Result<Self> {
        let urls: Vec<String> = options
            .urls
            .into_iter()
            .filter(|u| !u.trim().is_empty())
            .collect();
        if urls.is_empty() {
            return Err(IngestError::Config(
                "need at least one URL to poll a real-time feed".to_string(),
            ));
        }

        let database = non_empty(options.database).ok_or_else(|| {
            IngestError::Config("missing required argument: database".to_string())
        })?;

        if options.interval_secs == 0 {
            return Err(IngestError::Config(
                "interval must be at least one second".to_string(),
            ));
        }
        if options.timeout_secs == 0 {
            return Err(IngestError::Config(
                "request timeout must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            urls,
            database,
            interval: Duration::from_secs(options.interval_secs),
            request_timeout: Duration::from_secs(options.timeout_secs),
            max_cycles: (options.max_cycles > 0).then_some(options.max_cycles),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_static_zip_and_database() {
        let config = StaticConfig::validate(StaticOptions {
            zip: Some(PathBuf::from("gtfs.zip")),
            database: Some("postgres://localhost/gtfs".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.source, BundleSource::Path(PathBuf::from("gtfs.zip")));
        assert_eq!(
            config.target,
            StaticTarget::Database("postgres://localhost/gtfs".to_string())
        );
    }

    #[test]
    fn test_static_rejects_both_sources() {
        let err = StaticConfig::validate(StaticOptions {
            zip: Some(PathBuf::from("gtfs.zip")),
            url: Some("http://example.com/gtfs.zip".to_string()),
            dry_run: true,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_static_rejects_neither_target() {
        let err = StaticConfig::validate(StaticOptions {
            url: Some("http://example.com/gtfs.zip".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("--dry-run"));
    }

    #[test]
    fn test_static_rejects_dry_run_with_database() {
        let result = StaticConfig::validate(StaticOptions {
            url: Some("http://example.com/gtfs.zip".to_string()),
            database: Some("postgres://localhost/gtfs".to_string()),
            dry_run: true,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_static_toml_overrides_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.toml");
        std::fs::write(
            &path,
            "default_url = \"http://example.com/gtfs.zip\"\ndefault_database = \"postgres://db/gtfs\"\n",
        )
        .unwrap();

        let config = StaticOptions {
            toml: Some(path),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(
            config.source,
            BundleSource::Url("http://example.com/gtfs.zip".to_string())
        );
        assert_eq!(
            config.target,
            StaticTarget::Database("postgres://db/gtfs".to_string())
        );
    }

    #[test]
    fn test_realtime_requires_a_url() {
        let err = RealtimeConfig::validate(RealtimeOptions {
            database: Some("postgres://db/gtfs".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_realtime_requires_database() {
        let err = RealtimeConfig::validate(RealtimeOptions {
            urls: vec!["http://example.com/rt".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_realtime_toml_keeps_url_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.toml");
        std::fs::write(
            &path,
            "urls = [\"http://a/rt\", \"http://b/rt\"]\ndatabase = \"postgres://db/gtfs\"\ninterval_secs = 5\nmax_cycles = 3\n",
        )
        .unwrap();

        let config = RealtimeOptions {
            toml: Some(path),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(config.urls, vec!["http://a/rt", "http://b/rt"]);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_cycles, Some(3));
    }

    #[test]
    fn test_realtime_zero_max_cycles_means_unbounded() {
        let config = RealtimeConfig::validate(RealtimeOptions {
            urls: vec!["http://example.com/rt".to_string()],
            database: Some("postgres://db/gtfs".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.max_cycles, None);
    }

    #[test]
    fn test_malformed_toml_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "urls = [").unwrap();

        let err = RealtimeOptions {
            toml: Some(path),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
