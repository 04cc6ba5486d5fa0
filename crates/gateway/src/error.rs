use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    relaydesk_common::{ErrorKind, FromMessage},
    relaydesk_sessions::SessionStatus,
    tracing::warn,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, or closed for anything but history reads.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("cannot {action} a session in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("invalid request: {message}")]
    InvalidInput { message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] relaydesk_sessions::Error),

    #[error(transparent)]
    Messaging(#[from] relaydesk_channels::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_transition(action: &'static str, status: SessionStatus) -> Self {
        Self::InvalidTransition { action, status }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Store(e) => e.kind(),
            Self::Messaging(e) => e.kind(),
            Self::Message { message } => ErrorKind::classify(message),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::TransientNetwork => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(kind = %self.kind(), error = %self, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(Error::not_found("s").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::invalid_transition("claim", SessionStatus::Bot).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::invalid_input("missing sessionId").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Store(relaydesk_sessions::Error::DuplicateOpen {
                visitor_id: "v".into()
            })
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn transition_message_names_status() {
        let err = Error::invalid_transition("claim", SessionStatus::Bot);
        assert_eq!(err.to_string(), "cannot claim a session in status bot");
    }
}
