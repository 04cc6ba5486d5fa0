//! Shared error taxonomy and retry helpers used across relaydesk crates.

pub mod error;
pub mod retry;

pub use {
    error::{Error, ErrorKind, FromMessage, Result},
    retry::{RetryError, RetryPolicy, is_retryable, with_retry},
};
