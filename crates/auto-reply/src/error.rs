use relaydesk_common::{ErrorKind, FromMessage};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sending the acknowledgment failed.
    #[error("auto-reply send failed after {attempts} attempt(s): {source}")]
    Send {
        attempts: u32,
        #[source]
        source: relaydesk_channels::Error,
    },

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
        match self {
            Self::Send { source, .. } => source.kind(),
            Self::Message { message } => ErrorKind::classify(message),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}
