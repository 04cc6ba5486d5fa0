//! Persistent sessions and their append-only message log.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    error::{Error, Result},
    model::{ChatMessage, Claimant, Session, SessionStatus},
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session. Fails with [`Error::DuplicateOpen`] when the
    /// visitor already has a non-closed session.
    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>>;

    async fn find_open_session(&self, visitor_id: &str) -> Result<Option<Session>>;

    /// Atomically move a session whose status is one of `from` to `to`.
    ///
    /// `claimant` must be present exactly when `to` is live. Returns the
    /// updated session, or `None` when the session is missing or its status
    /// is not in `from`.
    async fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        to: SessionStatus,
        claimant: Option<&Claimant>,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>>;

    /// Refresh `last_activity_at` on an open session. An earlier `at` than
    /// the stored value leaves it unchanged.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn set_current_page(&self, id: &str, page: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Open sessions with the given status, oldest first.
    async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<Session>>;

    /// Close every open session idle since before `cutoff`; returns their ids.
    async fn close_idle(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<String>>;

    async fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// The most recent `limit` messages in chronological order.
    async fn messages(&self, session_id: &str, limit: u32) -> Result<Vec<ChatMessage>>;
}

// ── SQLite ──────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    visitor_id: String,
    visitor_name: String,
    visitor_email: Option<String>,
    visitor_phone: Option<String>,
    current_page: Option<String>,
    location: String,
    status: String,
    claimed_by: Option<String>,
    claimed_by_name: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_activity_at: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;

    fn try_from(r: SessionRow) -> Result<Self> {
        Ok(Self {
            status: r.status.parse()?,
            created_at: from_ms(r.created_at)?,
            updated_at: from_ms(r.updated_at)?,
            last_activity_at: from_ms(r.last_activity_at)?,
            id: r.id,
            visitor_id: r.visitor_id,
            visitor_name: r.visitor_name,
            visitor_email: r.visitor_email,
            visitor_phone: r.visitor_phone,
            current_page: r.current_page,
            location: r.location,
            claimed_by: r.claimed_by,
            claimed_by_name: r.claimed_by_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    sender: String,
    content: String,
    timestamp: i64,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            sender: r.sender.parse()?,
            timestamp: from_ms(r.timestamp)?,
            id: r.id,
            session_id: r.session_id,
            content: r.content,
        })
    }
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::invalid_data(format!("timestamp out of range: {ms}")))
}

const SESSION_COLUMNS: &str = "id, visitor_id, visitor_name, visitor_email, visitor_phone, \
     current_page, location, status, claimed_by, claimed_by_name, created_at, updated_at, \
     last_activity_at";

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert_session(&self, s: &Session) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO sessions (id, visitor_id, visitor_name, visitor_email, visitor_phone,
                 current_page, location, status, claimed_by, claimed_by_name, created_at,
                 updated_at, last_activity_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&s.id)
        .bind(&s.visitor_id)
        .bind(&s.visitor_name)
        .bind(&s.visitor_email)
        .bind(&s.visitor_phone)
        .bind(&s.current_page)
        .bind(&s.location)
        .bind(s.status.as_str())
        .bind(&s.claimed_by)
        .bind(&s.claimed_by_name)
        .bind(s.created_at.timestamp_millis())
        .bind(s.updated_at.timestamp_millis())
        .bind(s.last_activity_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::DuplicateOpen {
                    visitor_id: s.visitor_id.clone(),
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn find_open_session(&self, visitor_id: &str) -> Result<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE visitor_id = ? AND status != 'closed'"
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(visitor_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        to: SessionStatus,
        claimant: Option<&Claimant>,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        if (to == SessionStatus::Live) != claimant.is_some() {
            return Err(Error::invalid_data(format!(
                "a claimant is required exactly for live sessions (target: {to})"
            )));
        }
        if from.is_empty() {
            return Ok(None);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE sessions SET status = ?, claimed_by = ?, claimed_by_name = ?, \
             updated_at = ?, last_activity_at = ? \
             WHERE id = ? AND status IN ({placeholders}) RETURNING {SESSION_COLUMNS}"
        );
        let ms = at.timestamp_millis();
        let mut query = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(to.as_str())
            .bind(claimant.map(|c| c.admin_id.as_str()))
            .bind(claimant.map(|c| c.admin_name.as_str()))
            .bind(ms)
            .bind(ms)
            .bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        query
            .fetch_optional(&self.pool)
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_activity_at = MAX(last_activity_at, ?) \
             WHERE id = ? AND status != 'closed'",
        )
        .bind(at.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_current_page(&self, id: &str, page: &str, at: DateTime<Utc>) -> Result<bool> {
        let ms = at.timestamp_millis();
        let result = sqlx::query(
            "UPDATE sessions SET current_page = ?, updated_at = ?, \
             last_activity_at = MAX(last_activity_at, ?) \
             WHERE id = ? AND status != 'closed'",
        )
        .bind(page)
        .bind(ms)
        .bind(ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ? ORDER BY created_at, id"
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Session::try_from)
            .collect()
    }

    async fn close_idle(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "UPDATE sessions SET status = 'closed', claimed_by = NULL, claimed_by_name = NULL, \
             updated_at = ? WHERE status != 'closed' AND last_activity_at < ? RETURNING id",
        )
        .bind(at.timestamp_millis())
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn append_message(&self, m: &ChatMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, sender, content, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&m.id)
        .bind(&m.session_id)
        .bind(m.sender.as_str())
        .bind(&m.content)
        .bind(m.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages(&self, session_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, session_id, sender, content, timestamp FROM (
                 SELECT seq, id, session_id, sender, content, timestamp FROM chat_messages
                 WHERE session_id = ? ORDER BY timestamp DESC, seq DESC LIMIT ?
               ) ORDER BY timestamp ASC, seq ASC"#,
        )
        .bind(session_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ChatMessage::try_from)
        .collect()
    }
}
