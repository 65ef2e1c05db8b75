//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Broad classes of failure, used to decide whether a failure is
/// recoverable (real-time network errors) or ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or contradictory startup options.
    Configuration,
    /// The bundle or a file inside it cannot be ingested as-is.
    MalformedInput,
    /// Fetch failures, non-success statuses and undecodable payloads.
    Network,
    /// The store rejected a statement or a bulk load, or local disk I/O failed.
    Persistence,
}

/// Errors that can occur during static or real-time ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required GTFS file is absent from the extracted bundle.
    #[error("Required file {0} is missing")]
    MissingRequiredFile(String),

    /// A required GTFS file exists but holds no data.
    #[error("Required file {0} is empty")]
    EmptyTable(String),

    /// The archive contains a directory member.
    #[error("Archive member {0} is a directory")]
    DirectoryEntry(String),

    /// Two archive members flatten to the same file name.
    #[error("Archive has more than one member named {0}")]
    DuplicateMember(String),

    /// A delimited row disagrees with its header on field count.
    #[error("{file}: line {line} has {found} fields, header declares {expected}")]
    FieldCountMismatch {
        file: String,
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A trip update arrived without its trip descriptor.
    #[error("TripUpdate in entity {0} does not contain a TripDescriptor")]
    MissingTripDescriptor(String),

    /// The server answered with a non-success status.
    #[error("HTTP error from {url}: status code {status}")]
    HttpStatus { url: String, status: u16 },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    /// Protobuf decoding error.
    #[error("Protobuf error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Store error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited text error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Archive error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl IngestError {
    /// Classifies the error into the taxonomy the loaders act on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Config(_) | IngestError::Toml(_) | IngestError::InvalidUrl(_) => {
                ErrorKind::Configuration
            }
            IngestError::MissingRequiredFile(_)
            | IngestError::EmptyTable(_)
            | IngestError::DirectoryEntry(_)
            | IngestError::DuplicateMember(_)
            | IngestError::FieldCountMismatch { .. }
            | IngestError::MissingTripDescriptor(_)
            | IngestError::Csv(_)
            | IngestError::Zip(_) => ErrorKind::MalformedInput,
            IngestError::HttpStatus { .. } | IngestError::Http(_) | IngestError::Decode(_) => {
                ErrorKind::Network
            }
            IngestError::Database(_) | IngestError::Io(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_message_names_file() {
        let err = IngestError::MissingRequiredFile("stops.txt".to_string());
        assert_eq!(err.to_string(), "Required file stops.txt is missing");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_http_status_is_network() {
        let err = IngestError::HttpStatus {
            url: "http://example.com/feed".to_string(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_database_error_is_persistence() {
        let err = IngestError::Database(sqlx::Error::Protocol("copy rejected".into()));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
