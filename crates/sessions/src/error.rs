use {
    relaydesk_common::{ErrorKind, FromMessage},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The visitor already has an open session.
    #[error("visitor {visitor_id} already has an open session")]
    DuplicateOpen { visitor_id: String },

    #[error("invalid stored data: {message}")]
    InvalidData { message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sqlx(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
                ErrorKind::TransientNetwork
            },
            Self::DuplicateOpen { .. } => ErrorKind::InvalidTransition,
            _ => ErrorKind::Persistence,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
