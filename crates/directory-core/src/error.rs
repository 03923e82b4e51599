//! Error types for directory operations.
//!
//! Every failure in the facade surfaces as one of the variants below; nothing
//! is swallowed or retried internally. The four operation-level classes
//! (connect syntax, directory, not-found, conflict) are complemented by
//! configuration, timeout and API-misuse variants.

use serde::Serialize;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The target host/protocol/port was rejected before any network attempt.
    ///
    /// Not retriable without changing the configuration.
    #[error("Invalid directory target: {0}")]
    ConnectSyntax(String),

    /// The directory server or the native client reported a failure during
    /// STARTTLS, bind, search, modify or add.
    #[error("Directory operation failed: {message} (result code {code})")]
    Directory {
        /// Server diagnostic message when available, otherwise a formatted
        /// fallback describing the failure.
        message: String,
        /// Numeric LDAP result code; 0 when the failure never produced a
        /// protocol result (e.g. an I/O error).
        code: u32,
    },

    /// No entry matched the lookup.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target DN already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error detected locally.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The API surface was misused (empty DN, detached entry, missing base).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a [`Error::Directory`] from a server diagnostic and result code.
    ///
    /// The diagnostic string is preferred; when the server sent none, a
    /// formatted fallback naming the result code is used instead.
    #[must_use]
    pub fn directory(message: impl Into<String>, code: u32) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            format!("server returned result code {code}")
        } else {
            message
        };
        Self::Directory { message, code }
    }

    /// Returns the stable error code for this error type.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectSyntax(_) => "CONNECT_SYNTAX",
            Self::Directory { .. } => "DIRECTORY_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Directory { .. } | Self::Config(_) | Self::Timeout(_)
        )
    }

    /// Converts the error into an [`ErrorResponse`].
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
        }
    }
}

/// Structured error response for serialization into logs or API payloads.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConnectSyntax(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            Error::ConnectSyntax("bad port".to_string()).error_code(),
            "CONNECT_SYNTAX"
        );
        assert_eq!(Error::directory("denied", 50).error_code(), "DIRECTORY_ERROR");
        assert_eq!(
            Error::NotFound("uid=jdoe".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::Conflict("uid=jdoe".to_string()).error_code(),
            "CONFLICT"
        );
        assert_eq!(Error::Config("no base".to_string()).error_code(), "CONFIG_ERROR");
        assert_eq!(Error::Timeout("bind".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::InvalidRequest("empty dn".to_string()).error_code(),
            "INVALID_REQUEST"
        );
    }

    #[test]
    fn directory_error_prefers_server_diagnostic() {
        let err = Error::directory("Insufficient access", 50);
        assert_eq!(
            err.to_string(),
            "Directory operation failed: Insufficient access (result code 50)"
        );
    }

    #[test]
    fn directory_error_falls_back_on_empty_diagnostic() {
        let err = Error::directory("", 49);
        assert!(matches!(
            &err,
            Error::Directory { message, code: 49 } if message == "server returned result code 49"
        ));
    }

    #[test]
    fn should_log_flags_serious_errors() {
        assert!(Error::directory("down", 52).should_log());
        assert!(Error::Config("bad ca".to_string()).should_log());
        assert!(Error::Timeout("search".to_string()).should_log());

        assert!(!Error::NotFound("entry".to_string()).should_log());
        assert!(!Error::Conflict("entry".to_string()).should_log());
        assert!(!Error::ConnectSyntax("target".to_string()).should_log());
    }

    #[test]
    fn from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let err: Error = err.into();
        assert!(matches!(err, Error::ConnectSyntax(_)));
    }

    #[test]
    fn error_response_serialization() {
        let response = Error::NotFound("uid=jdoe".to_string()).into_error_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("NOT_FOUND"));
        assert!(json.contains("Not found: uid=jdoe"));
        assert!(!json.contains("details"));
    }
}
