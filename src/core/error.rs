use thiserror::Error;

/// Errors raised by the document store driver.
///
/// Every variant carries a stable numeric code (see [`StoreError::code`]) so
/// callers can classify failures without inspecting the message text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("BadValue: {0}")]
    BadValue(String),

    #[error("Failed to parse: {0}")]
    FailedToParse(String),

    #[error("connect ECONNREFUSED {0}")]
    HostUnreachable(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Authentication failed.")]
    AuthenticationFailed,

    #[error("{0}")]
    Unauthorized(String),

    #[error("ns not found: {0}")]
    NamespaceNotFound(String),

    #[error("Collection already exists. NS: {0}")]
    NamespaceExists(String),

    #[error("no such command: '{0}'")]
    CommandNotFound(String),

    #[error("Invalid namespace specified '{0}'")]
    InvalidNamespace(String),

    #[error("Invalid connection string: {0}")]
    InvalidOptions(String),

    #[error("Server selection timed out after {0} ms")]
    ServerSelectionTimeout(u64),

    #[error("Connection to {0} is closed")]
    ConnectionClosed(String),

    #[error("E11000 duplicate key error collection: {ns} dup key: {key}")]
    DuplicateKey { ns: String, key: String },

    #[error("Internal error: {0}")]
    Internal(String),

    /// Failure reported by a store reached through a plugged-in connector
    #[error("{message}")]
    Driver { code: i32, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Numeric error code, following the conventions of document-store servers
    pub fn code(&self) -> i32 {
        match self {
            Self::BadValue(_) => 2,
            Self::HostUnreachable(_) => 6,
            Self::FailedToParse(_) => 9,
            Self::TypeMismatch(_) => 14,
            Self::Unauthorized(_) => 13,
            Self::AuthenticationFailed => 18,
            Self::NamespaceNotFound(_) => 26,
            Self::NamespaceExists(_) => 48,
            Self::CommandNotFound(_) => 59,
            Self::InvalidOptions(_) => 72,
            Self::InvalidNamespace(_) => 73,
            Self::ServerSelectionTimeout(_) => 89,
            Self::ConnectionClosed(_) => 91,
            Self::DuplicateKey { .. } => 11000,
            Self::Internal(_) => 1,
            Self::Driver { code, .. } => *code,
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self {
            Self::BadValue(_) => "BadValue",
            Self::HostUnreachable(_) => "HostUnreachable",
            Self::FailedToParse(_) => "FailedToParse",
            Self::TypeMismatch(_) => "TypeMismatch",
            Self::Unauthorized(_) => "Unauthorized",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::NamespaceNotFound(_) => "NamespaceNotFound",
            Self::NamespaceExists(_) => "NamespaceExists",
            Self::CommandNotFound(_) => "CommandNotFound",
            Self::InvalidOptions(_) => "InvalidOptions",
            Self::InvalidNamespace(_) => "InvalidNamespace",
            Self::ServerSelectionTimeout(_) => "NetworkTimeout",
            Self::ConnectionClosed(_) => "ShutdownInProgress",
            Self::DuplicateKey { .. } => "DuplicateKey",
            Self::Internal(_) => "InternalError",
            Self::Driver { .. } => "DriverError",
        }
    }

    /// True for failures that happen while establishing a connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::HostUnreachable(_)
                | Self::AuthenticationFailed
                | Self::InvalidOptions(_)
                | Self::ServerSelectionTimeout(_)
                | Self::ConnectionClosed(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::FailedToParse(err.to_string())
    }
}

impl From<regex::Error> for StoreError {
    fn from(err: regex::Error) -> Self {
        StoreError::BadValue(format!("invalid $regex: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StoreError::AuthenticationFailed.code(), 18);
        assert_eq!(StoreError::CommandNotFound("x".into()).code(), 59);
        assert_eq!(StoreError::Internal("x".into()).code(), 1);
        let external = StoreError::Driver {
            code: 13297,
            message: "db already exists with different case".into(),
        };
        assert_eq!((external.code(), external.code_name()), (13297, "DriverError"));
        assert_eq!(external.to_string(), "db already exists with different case");
        assert_eq!(
            StoreError::DuplicateKey {
                ns: "db.c".into(),
                key: "1".into()
            }
            .code(),
            11000
        );
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(StoreError::HostUnreachable("localhost:1".into()).is_connection_error());
        assert!(StoreError::ServerSelectionTimeout(10).is_connection_error());
        assert!(!StoreError::BadValue("x".into()).is_connection_error());
    }
}
