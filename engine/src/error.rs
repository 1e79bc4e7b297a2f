//! Error types for the mirror engine.

use thiserror::Error;

/// A failure reported by a [`Transport`](crate::Transport).
///
/// Carries the HTTP status (0 when no response was received) and a message,
/// usually the response text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport failed with status {status}: {message}")]
pub struct TransportError {
    pub status: u16,
    pub message: String,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// All possible errors from the mirror engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Local precondition failures, no request was issued
    #[error("No url or invalid url specified for fetch")]
    NoFetchUrl,

    #[error("Unable to calculate total pages.")]
    UnknownPageCount,

    #[error("Page requested out of range for current set.")]
    PageOutOfRange { page: u64, start: u64, end: u64 },

    // Configuration errors
    #[error("URL is not set on model")]
    MissingUrl,

    #[error("collection url is not set")]
    MissingCollectionUrl,

    #[error("expected a CRUD or HTTP verb, got '{0}'")]
    UnknownVerb(String),

    #[error("no transport configured")]
    MissingTransport,

    // Remote errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("fetch superseded by a newer request")]
    Superseded,
}

impl Error {
    /// HTTP-style status for local rejections and transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::NoFetchUrl | Error::PageOutOfRange { .. } => Some(404),
            Error::UnknownPageCount => Some(400),
            Error::Transport(e) => Some(e.status),
            _ => None,
        }
    }

    /// Whether this error indicates a programming or configuration mistake
    /// that no request could satisfy.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingUrl
                | Error::MissingCollectionUrl
                | Error::UnknownVerb(_)
                | Error::MissingTransport
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
