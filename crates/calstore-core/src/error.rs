//! Error types for calstore with categorization:
//!
//! - **Caller errors**: malformed search trees and invalid input (exit code 1)
//! - **Configuration errors**: unreadable or invalid configuration (exit code 1)
//! - **System errors**: IO failures (exit code 2)
//! - **Execution errors**: missing resources (exit code 3) and database failures (exit code 4)
//!
//! Caller errors describe a programming mistake in the query tree handed to the
//! search compiler. They are never retryable.

use thiserror::Error;

/// Top-level error type for the calstore crates.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A search term is structurally invalid (missing column operand, bad constant, ...).
    #[error("Invalid search term: {0}")]
    InvalidSearchTerm(String),

    /// A search term references a field with no column mapping.
    #[error("No mapping available for field '{field}'")]
    UnmappableField { field: String },

    /// A special-cased field was used with an operator it does not support.
    #[error("Unsupported operation for {field}: {operation}")]
    UnsupportedOperation { field: String, operation: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration or payload could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO failure.
    #[error("IO error: {0}")]
    Io(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl Error {
    /// Create a caller error for a malformed search term.
    pub fn invalid_search_term(msg: impl Into<String>) -> Self {
        Self::InvalidSearchTerm(msg.into())
    }

    /// Create a caller error for a field without column mapping.
    pub fn unmappable_field(field: impl std::fmt::Display) -> Self {
        Self::UnmappableField {
            field: field.to_string(),
        }
    }

    /// Create a caller error for an operator a special field cannot handle.
    pub fn unsupported_operation(
        field: impl std::fmt::Display,
        operation: impl std::fmt::Display,
    ) -> Self {
        Self::UnsupportedOperation {
            field: field.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an IO error.
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a database error.
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSearchTerm(_) => "INVALID_SEARCH_TERM",
            Self::UnmappableField { .. } => "UNMAPPABLE_FIELD",
            Self::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether this error describes a malformed request from the caller.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSearchTerm(_)
                | Self::UnmappableField { .. }
                | Self::UnsupportedOperation { .. }
        )
    }

    /// Whether retrying the failed operation could succeed.
    ///
    /// Only database failures are transient; everything else fails again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns the appropriate exit code for this error type.
    ///
    /// - 1: caller or configuration error
    /// - 2: system error
    /// - 3: not found
    /// - 4: database error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidSearchTerm(_)
            | Self::UnmappableField { .. }
            | Self::UnsupportedOperation { .. }
            | Self::InvalidConfig(_)
            | Self::Parse(_) => 1,
            Self::Io(_) => 2,
            Self::NotFound(_) => 3,
            Self::Database(_) => 4,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::parse_error(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::parse_error(format!("Failed to parse config: {err}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
