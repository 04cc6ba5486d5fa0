use std::error::Error as StdError;

use relaydesk_common::{ErrorKind, FromMessage};

/// Crate-wide result type for messaging operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed messaging errors shared across client implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid messaging input: {message}")]
    InvalidInput { message: String },

    /// The named messaging client is not registered.
    #[error("unknown messaging client: {client_id}")]
    UnknownClient { client_id: String },

    /// The client exists but is not connected.
    #[error("messaging client unavailable: {message}")]
    Unavailable { message: String },

    /// The client did not answer in time.
    #[error("messaging request timed out: {operation}")]
    Timeout { operation: String },

    /// The network rejected or failed the request.
    #[error("messaging request failed: {message}")]
    Rejected { message: String },

    /// Wrapped source error from an external dependency.
    #[error("messaging operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_client(client_id: impl std::fmt::Display) -> Self {
        Self::UnknownClient {
            client_id: client_id.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl std::fmt::Display) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
        }
    }

    #[must_use]
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } | Self::SerdeJson(_) => ErrorKind::InvalidInput,
            Self::UnknownClient { .. } => ErrorKind::NotFound,
            Self::Unavailable { .. } | Self::Timeout { .. } => ErrorKind::TransientNetwork,
            Self::Rejected { message } => ErrorKind::classify(message),
            Self::External { source, .. } => ErrorKind::classify(&source.to_string()),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Rejected { message }
    }
}
