//! Error types for bf-core
//!
//! Provides a unified error type that carries the HTTP-style status of remote
//! failures and can be converted to appropriate exit codes.

use thiserror::Error;

/// Result type alias for bf-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bf-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid directory key or remote path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Alias not found
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// Alias already exists
    #[error("Alias already exists: {0}")]
    AliasExists(String),

    /// A file attribute required by the operation is not set
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// The file body cannot be uploaded in its current representation
    #[error("Forbidden: Invalid body type: {0}")]
    InvalidBodyType(String),

    /// Multipart upload cannot be completed as requested
    #[error("Multipart integrity failure: {0}")]
    MultipartIntegrity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML encoding or decoding error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Remote call rejected with 401 or 403
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Resource not found (remote 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote call answered with a non-2xx status other than 404
    #[error("Transport error ({status}): {message}")]
    Transport { status: u16, message: String },

    /// Connection-level failure with no status
    #[error("Network error: {0}")]
    Network(String),

    /// Conflict error
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Feature not supported by backend
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Build an error from a remote status code
    ///
    /// 404 becomes [`Error::NotFound`], everything else [`Error::Transport`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => Error::NotFound(message.into()),
            401 | 403 => Error::Auth {
                status,
                message: message.into(),
            },
            _ => Error::Transport {
                status,
                message: message.into(),
            },
        }
    }

    /// HTTP-style status code carried by this error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Error::NotFound(_) => Some(404),
            Error::Transport { status, .. } | Error::Auth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a remote "not found"
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Append a note to the message, keeping the variant and status
    pub fn context(self, note: impl std::fmt::Display) -> Self {
        let with = |message: String| format!("{message} ({note})");
        match self {
            Error::NotFound(m) => Error::NotFound(with(m)),
            Error::Auth { status, message } => Error::Auth {
                status,
                message: with(message),
            },
            Error::Transport { status, message } => Error::Transport {
                status,
                message: with(message),
            },
            Error::Network(m) => Error::Network(with(m)),
            Error::MultipartIntegrity(m) => Error::MultipartIntegrity(with(m)),
            Error::InvalidBodyType(m) => Error::InvalidBodyType(with(m)),
            Error::Conflict(m) => Error::Conflict(with(m)),
            Error::Xml(m) => Error::Xml(with(m)),
            Error::General(m) => Error::General(with(m)),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), with(e.to_string()))),
            other => other,
        }
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::MissingAttribute(_) => 2, // UsageError
            Error::Config(_) | Error::InvalidBodyType(_) => 2,       // UsageError
            Error::Network(_) | Error::Transport { .. } => 3,        // NetworkError
            Error::Auth { .. } => 4,                                 // AuthError
            Error::NotFound(_) | Error::AliasNotFound(_) => 5,       // NotFound
            Error::Conflict(_) | Error::AliasExists(_) => 6,         // Conflict
            Error::UnsupportedFeature(_) => 7,                       // UnsupportedFeature
            _ => 1,                                                  // GeneralError
        }
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::SeError> for Error {
    fn from(err: quick_xml::SeError) -> Self {
        Error::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(Error::InvalidPath("test".into()).exit_code(), 2);
        assert_eq!(Error::MissingAttribute("key").exit_code(), 2);
        assert_eq!(Error::InvalidBodyType("stream".into()).exit_code(), 2);
        assert_eq!(Error::Network("test".into()).exit_code(), 3);
        assert_eq!(
            Error::Transport {
                status: 500,
                message: "boom".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(Error::from_status(401, "test").exit_code(), 4);
        assert_eq!(Error::NotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::AliasNotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::AliasExists("test".into()).exit_code(), 6);
        assert_eq!(Error::UnsupportedFeature("test".into()).exit_code(), 7);
        assert_eq!(Error::MultipartIntegrity("test".into()).exit_code(), 1);
    }

    #[test]
    fn test_from_status() {
        assert!(Error::from_status(404, "missing").is_not_found());
        let denied = Error::from_status(403, "denied");
        assert!(matches!(denied, Error::Auth { status: 403, .. }));
        assert_eq!(denied.status(), Some(403));
        assert_eq!(denied.to_string(), "Authentication failed (403): denied");

        let err = Error::from_status(503, "slow down");
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_context_keeps_kind_and_status() {
        let err = Error::from_status(500, "InternalError").context("abort failed");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "Transport error (500): InternalError (abort failed)");

        let err = Error::from_status(404, "a.txt").context("x");
        assert!(err.is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        match Error::from(io).context("part 3") {
            Error::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
                assert!(e.to_string().contains("part 3"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidBodyType("stream".into());
        assert_eq!(err.to_string(), "Forbidden: Invalid body type: stream");

        let err = Error::Transport {
            status: 500,
            message: "InternalError".into(),
        };
        assert_eq!(err.to_string(), "Transport error (500): InternalError");
    }
}
