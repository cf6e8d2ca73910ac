//! Error types for prom-count

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while receiving and tracking series
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snappy decompression of a remote-write body failed
    #[error("Snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    /// Remote-write protobuf payload could not be decoded
    #[error("Failed to decode write request: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// Metric registration or lookup failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tracker refused a batch
    #[error("Tracker {tracker} failed to observe batch: {reason}")]
    Tracker { tracker: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was caused by a malformed client payload.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::Snappy(_) | Error::Protobuf(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_classification() {
        let snappy_err = snap::raw::Decoder::new()
            .decompress_vec(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
            .unwrap_err();
        assert!(Error::from(snappy_err).is_bad_request());

        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "reset"));
        assert!(!err.is_bad_request());

        let err = Error::Config("no windows".to_string());
        assert!(!err.is_bad_request());
    }

    #[test]
    fn test_display() {
        let err = Error::Tracker {
            tracker: "active".to_string(),
            reason: "closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Tracker active failed to observe batch: closed"
        );
    }
}
