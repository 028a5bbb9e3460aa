//! Error definitions for odootable

use thiserror::Error;

/// Represents every way resolving a table block can fail.
///
/// # Example
/// ```rust
/// use odootable_common::OdooTableError;
///
/// fn example() -> odootable_common::Result<()> {
///     Err(OdooTableError::config("model", "missing"))
/// }
///
/// match example() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error occurred: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdooTableError {
    #[error("Configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Expected at most one header row, got {0}")]
    TooManyHeaderRows(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, OdooTableError>;

impl OdooTableError {
    /// Shorthand for a [`OdooTableError::Config`] on the given block key.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        OdooTableError::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the inner message without the type prefix.
    pub fn message(&self) -> &str {
        match self {
            OdooTableError::Config { reason, .. } => reason,
            OdooTableError::MalformedFilter(msg) => msg,
            OdooTableError::Connection(msg) => msg,
            OdooTableError::Auth(msg) => msg,
            OdooTableError::Remote { message, .. } => message,
            OdooTableError::TooManyHeaderRows(_) => "too many header rows",
            OdooTableError::Protocol(msg) => msg,
            OdooTableError::Cancelled => "cancelled",
            OdooTableError::InvalidState(msg) => msg,
        }
    }

    /// Get a short error kind name
    pub fn kind(&self) -> &'static str {
        match self {
            OdooTableError::Config { .. } => "config_error",
            OdooTableError::MalformedFilter(_) => "malformed_filter",
            OdooTableError::Connection(_) => "connection_error",
            OdooTableError::Auth(_) => "auth_error",
            OdooTableError::Remote { .. } => "remote_error",
            OdooTableError::TooManyHeaderRows(_) => "too_many_header_rows",
            OdooTableError::Protocol(_) => "protocol_error",
            OdooTableError::Cancelled => "cancelled",
            OdooTableError::InvalidState(_) => "invalid_state",
        }
    }

    /// Whether retrying the same operation can succeed.
    ///
    /// Only transport failures qualify; everything the server or the author
    /// got wrong is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, OdooTableError::Connection(_))
    }
}

impl From<std::io::Error> for OdooTableError {
    fn from(err: std::io::Error) -> Self {
        OdooTableError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for OdooTableError {
    fn from(err: serde_json::Error) -> Self {
        OdooTableError::Protocol(err.to_string())
    }
}
