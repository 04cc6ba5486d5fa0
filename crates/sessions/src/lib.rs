//! Session storage: visitor sessions, their append-only message log, the
//! operator settings row, and the session token convention used in
//! forwarded network messages.
//!
//! Backed by SQLite through sqlx; schema lives in `migrations/`.

pub mod error;
pub mod model;
pub mod settings;
pub mod store;
pub mod token;

pub use {
    error::{Error, Result},
    model::{ChatMessage, Claimant, NewSession, Sender, Session, SessionStatus, new_session_id},
    settings::{SettingsStore, SqliteSettingsStore, WhatsAppSettings},
    store::{SessionStore, SqliteSessionStore},
    token::extract_session_id,
};

/// Run database migrations for the sessions crate.
///
/// Creates the `sessions`, `chat_messages` and `whatsapp_settings` tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
