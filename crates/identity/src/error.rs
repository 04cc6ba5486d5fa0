use relaydesk_common::{ErrorKind, FromMessage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("identity cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity cache json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

relaydesk_common::impl_context!();
