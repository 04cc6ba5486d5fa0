use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    rand::{Rng, distr::Alphanumeric},
    serde::{Deserialize, Serialize},
};

use crate::error::Error;

/// Length of generated session ids; inside the 15..=30 token window the
/// reply bridge accepts.
pub const SESSION_ID_LEN: usize = 20;

/// Random ASCII alphanumeric session id.
#[must_use]
pub fn new_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Who owns the conversation.
///
/// `bot → queued → live → closed`, plus `queued | live → bot`. Closed is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Bot,
    Queued,
    Live,
    Closed,
}

impl SessionStatus {
    pub const OPEN: [Self; 3] = [Self::Bot, Self::Queued, Self::Live];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Queued => "queued",
            Self::Live => "live",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn is_open(self) -> bool {
        self != Self::Closed
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot" => Ok(Self::Bot),
            "queued" => Ok(Self::Queued),
            "live" => Ok(Self::Live),
            "closed" => Ok(Self::Closed),
            other => Err(Error::invalid_data(format!("unknown session status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Visitor,
    Bot,
    Admin,
}

impl Sender {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Bot => "bot",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visitor" => Ok(Self::Visitor),
            "bot" => Ok(Self::Bot),
            "admin" => Ok(Self::Admin),
            other => Err(Error::invalid_data(format!("unknown sender: {other}"))),
        }
    }
}

/// The admin currently holding a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claimant {
    pub admin_id: String,
    pub admin_name: String,
}

impl Claimant {
    pub fn new(admin_id: impl Into<String>, admin_name: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            admin_name: admin_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub visitor_id: String,
    pub visitor_name: String,
    pub visitor_email: Option<String>,
    pub visitor_phone: Option<String>,
    pub current_page: Option<String>,
    pub location: String,
    pub status: SessionStatus,
    pub claimed_by: Option<String>,
    pub claimed_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn claimant(&self) -> Option<Claimant> {
        match (&self.claimed_by, &self.claimed_by_name) {
            (Some(id), name) => Some(Claimant::new(id, name.clone().unwrap_or_default())),
            (None, _) => None,
        }
    }
}

/// Visitor details supplied when a session is started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSession {
    pub visitor_id: String,
    pub visitor_name: String,
    pub visitor_email: Option<String>,
    pub visitor_phone: Option<String>,
    pub current_page: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        session_id: impl Into<String>,
        sender: Sender,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            sender,
            content: content.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn session_ids_are_alphanumeric() {
        let id = new_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SessionStatus::Bot,
            SessionStatus::Queued,
            SessionStatus::Live,
            SessionStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn session_serializes_camel_case() {
        let now = Utc::now();
        let session = Session {
            id: "abc".into(),
            visitor_id: "v1".into(),
            visitor_name: "Budi".into(),
            visitor_email: None,
            visitor_phone: Some("0812".into()),
            current_page: None,
            location: "Jakarta".into(),
            status: SessionStatus::Queued,
            claimed_by: None,
            claimed_by_name: None,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["visitorPhone"], "0812");
        assert_eq!(value["status"], "queued");
        assert!(value.get("lastActivityAt").is_some());
    }
}
