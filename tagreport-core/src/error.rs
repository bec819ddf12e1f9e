//! Error types for tagreport-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tagreport-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing credentials, bad URL, invalid session)
    #[error("configuration error: {0}")]
    Config(String),

    /// Time window must cover at least one day
    #[error("invalid time window: --days must be a positive number of days, got {0}")]
    InvalidWindow(i64),

    /// Resume requested but no snapshot blob exists
    #[error("snapshot not found at {}; run without --no-api to harvest data first", .0.display())]
    SnapshotNotFound(PathBuf),

    /// An API endpoint failed permanently (non-retryable status or retries exhausted)
    #[error("harvest failed at {endpoint}: {message}")]
    Harvest { endpoint: String, message: String },

    /// Scraped page could not be loaded or understood
    #[error("scrape error: {0}")]
    Scrape(String),

    /// Report file could not be written
    #[error("failed to write report {}: {message}", path.display())]
    Report { path: PathBuf, message: String },

    /// Run was interrupted before completion
    #[error("run cancelled")]
    Cancelled,
}

/// Result type alias for tagreport-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_input() {
        let err = Error::SnapshotNotFound(PathBuf::from("/data/snapshot.json"));
        assert_eq!(
            err.to_string(),
            "snapshot not found at /data/snapshot.json; run without --no-api to harvest data first"
        );

        let err = Error::Harvest {
            endpoint: "https://acme.example/api/v3/tags".to_string(),
            message: "API error (401 Unauthorized)".to_string(),
        };
        assert!(err.to_string().starts_with("harvest failed at https://acme.example/api/v3/tags"));

        assert!(Error::InvalidWindow(0).to_string().contains("got 0"));
    }
}
