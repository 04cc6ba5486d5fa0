use {serde::Serialize, thiserror::Error};

/// Coarse failure classes shared by every component.
///
/// Crate-specific errors map onto one of these so the gateway can decide
/// whether to retry, degrade, report 404, or drop silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Session or resource missing or already closed.
    NotFound,
    /// Admin identity check failed.
    Unauthorized,
    /// Timeout, connection reset, temporary unavailability.
    TransientNetwork,
    /// Upstream rate limiting.
    RateLimited,
    /// Storage read or write failed.
    Persistence,
    /// Operation not allowed from the current state.
    InvalidTransition,
    /// Malformed caller input.
    InvalidInput,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may succeed on retry.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    /// Best-effort classification of an upstream error message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("429") || lower.contains("rate-overlimit") || lower.contains("rate limit")
        {
            Self::RateLimited
        } else if crate::retry::is_retryable(&lower) {
            Self::TransientNetwork
        } else if lower.contains("not found") {
            Self::NotFound
        } else {
            Self::Persistence
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::TransientNetwork => "transient_network",
            Self::RateLimited => "rate_limited",
            Self::Persistence => "persistence",
            Self::InvalidTransition => "invalid_transition",
            Self::InvalidInput => "invalid_input",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("{kind}: {message}")]
    Kind { kind: ErrorKind, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error")]
    Other {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Kind {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other {
            source: Box::new(source),
        }
    }

    /// The taxonomy class for this error.
    #[must_use]
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Kind { kind, .. } => *kind,
            Self::Io(_) => ErrorKind::Persistence,
            Self::Message(m) => ErrorKind::classify(m),
            Self::Other { source } => ErrorKind::classify(&source.to_string()),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Shared context trait ────────────────────────────────────────────────────

/// Trait for error types that can be constructed from a plain message string.
///
/// Implement this for your crate's error type, then invoke [`impl_context!`]
/// in your error module to get `.context()` and `.with_context()` on `Result`
/// and `Option`.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait with `.context()` and `.with_context()`
/// methods on `Result` and `Option`.
///
/// Invoke inside a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
///
/// ```ignore
/// // in crates/foo/src/error.rs
/// relaydesk_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let ctx = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("HTTP 429 Too Many Requests", ErrorKind::RateLimited)]
    #[case("server returned rate-overlimit", ErrorKind::RateLimited)]
    #[case("context deadline exceeded", ErrorKind::TransientNetwork)]
    #[case("Connection refused (os error 111)", ErrorKind::TransientNetwork)]
    #[case("session not found", ErrorKind::NotFound)]
    #[case("disk I/O error", ErrorKind::Persistence)]
    fn classify_messages(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::classify(message), expected);
    }

    #[test]
    fn explicit_kind_wins_over_message() {
        let err = Error::kind(ErrorKind::Unauthorized, "timeout while checking");
        assert_eq!(err.error_kind(), ErrorKind::Unauthorized);
        assert!(!err.error_kind().is_transient());
    }
}
