use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for parley-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Parley chat client
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Local persistence errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Parse/serialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Validation errors (rejected user input, out-of-range selections)
    #[error("validation error: {0}")]
    Validation(String),

    /// Completion backend could not produce a reply
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Internal misuse of the transcript or controller
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Clipboard capability failed
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error is a programming fault rather than an external condition
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Failures talking to the completion backend
///
/// The display strings are surfaced verbatim to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, DNS or TLS failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-2xx status
    #[error("Backend error: {} — {body}", status_line(.status, .status_text))]
    Status { status: u16, status_text: String, body: String },

    /// 2xx response whose body could not be decoded
    #[error("Invalid backend response: {0}")]
    Decode(String),

    /// No response within the configured timeout
    #[error("Backend did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
}

fn status_line(status: &u16, status_text: &str) -> String {
    let text = status_text.trim();
    if text.is_empty() { status.to_string() } else { format!("{} {}", status, text) }
}

impl TransportError {
    /// Create a status error
    pub fn status(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Status { status, status_text: status_text.into(), body: body.into() }
    }

    /// HTTP status code, when the backend answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Local persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage directory could not be created or is not a directory
    #[error("storage directory unavailable: {0}")]
    DirUnavailable(PathBuf),

    /// Key contains characters that cannot be mapped to a file name
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Stored value could not be decoded
    #[error("corrupted value for key '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let io_err: Error = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));
        assert_eq!(io_err.to_string(), "I/O error: file not found");

        let config_err = Error::Config("invalid profile".to_string());
        assert_eq!(config_err.to_string(), "configuration error: invalid profile");

        let parse_err = Error::Parse("invalid JSON".to_string());
        assert_eq!(parse_err.to_string(), "parse error: invalid JSON");

        let validation_err = Error::validation("empty prompt");
        assert_eq!(validation_err.to_string(), "validation error: empty prompt");

        let invariant_err = Error::invariant("no pending placeholder");
        assert_eq!(invariant_err.to_string(), "invariant violation: no pending placeholder");
        assert!(invariant_err.is_invariant());

        let other_err = Error::Other("something went wrong".to_string());
        assert_eq!(other_err.to_string(), "something went wrong");
        assert!(!other_err.is_invariant());
    }

    #[test]
    fn test_transport_status_display() {
        let err = TransportError::status(500, "Internal Server Error", "boom");
        assert_eq!(err.to_string(), "Backend error: 500 Internal Server Error — boom");
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn test_transport_status_without_reason_phrase() {
        let err = TransportError::status(599, "", "gateway gave up");
        assert_eq!(err.to_string(), "Backend error: 599 — gateway gave up");
    }

    #[test]
    fn test_transport_error_surfaces_verbatim() {
        let err: Error = TransportError::Network("connection refused".to_string()).into();
        assert_eq!(err.to_string(), "Network error: connection refused");
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_transport_timeout_display() {
        let err = TransportError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Backend did not respond within 60s");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::InvalidKey("../etc".to_string());
        assert_eq!(err.to_string(), "invalid storage key: ../etc");

        let err = StorageError::Corrupted { key: "chat_transcript".to_string(), reason: "EOF".to_string() };
        assert_eq!(err.to_string(), "corrupted value for key 'chat_transcript': EOF");

        let err: Error = StorageError::DirUnavailable(PathBuf::from("/nope")).into();
        assert_eq!(err.to_string(), "storage error: storage directory unavailable: /nope");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: Error = io_err.into();
        assert_eq!(error.to_string(), "I/O error: denied");
    }

    #[test]
    fn test_result_type_alias() {
        let ok: Result<i32> = Ok(42);
        assert!(ok.is_ok());

        let err: Result<i32> = Err(Error::Other("error".to_string()));
        assert!(err.is_err());
    }
}
