use {
    relaydesk_common::{ErrorKind, FromMessage},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("chat completion API error HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("chat completion returned no content")]
    EmptyResponse,

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
            Self::Api { status: 429, .. } => ErrorKind::RateLimited,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::TransientNetwork,
            Self::Http(e) if e.is_timeout() || e.is_connect() => ErrorKind::TransientNetwork,
            Self::Api { .. } | Self::Http(_) | Self::Json(_) | Self::EmptyResponse => {
                ErrorKind::InvalidInput
            },
            Self::Message { message } => ErrorKind::classify(message),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
