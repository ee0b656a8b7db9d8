//! Error types for the dBranch data model.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding or validating articles and records.
#[derive(Error, Debug)]
pub enum Error {
    /// Article name is not a plain file name with a recognized extension.
    #[error("invalid article name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Description of what's wrong.
        reason: &'static str,
    },

    /// Content location does not use the content-address URI scheme.
    #[error("invalid content location '{0}'")]
    InvalidLocation(String),

    /// A required field was empty.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// Unknown article list name.
    #[error("unknown article list '{0}'")]
    UnknownList(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_name_display() {
        let err = Error::InvalidName {
            name: "../etc".to_string(),
            reason: "contains a path separator",
        };
        let msg = err.to_string();
        assert!(msg.contains("../etc"));
        assert!(msg.contains("path separator"));
    }

    #[test]
    fn test_invalid_location_display() {
        let err = Error::InvalidLocation("https://example.com/a".to_string());
        assert!(err.to_string().contains("https://example.com/a"));
    }

    #[test]
    fn test_invalid_field_display() {
        let err = Error::InvalidField {
            field: "cid",
            reason: "must not be empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cid"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not valid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
