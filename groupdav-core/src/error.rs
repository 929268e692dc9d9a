//! Error types for the groupdav core.

use thiserror::Error;

/// Errors that can occur in groupdav operations.
#[derive(Error, Debug)]
pub enum DavError {
    #[error("ICS parse error: {0}")]
    Parse(String),

    #[error("Invalid sync token: {0}")]
    InvalidSyncToken(String),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Calendar object not found: {0}")]
    ObjectNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DavError {
    /// Whether the error is the caller's fault (a bad request) rather than ours.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::InvalidSyncToken(_)
                | Self::CalendarNotFound(_)
                | Self::ObjectNotFound(_)
        )
    }
}

/// Result type alias for groupdav operations.
pub type DavResult<T> = Result<T, DavError>;
