//! Session lifecycle: creation, handover, claims and inactivity cleanup.
//!
//! ```text
//! bot ──handover──▶ queued ──claim──▶ live ──close──▶ closed
//!  ▲                  │                 │
//!  └────return────────┴─────────────────┘
//! ```

use std::{sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    relaydesk_chat::{ChatEngine, EngineReply, ScriptedEngine},
    relaydesk_config::SessionsConfig,
    relaydesk_sessions::{
        ChatMessage, Claimant, NewSession, Sender, Session, SessionStatus, SessionStore,
        new_session_id,
    },
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    presence::{AdminPresence, PresenceRoster, PresenceStatus},
};

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

pub fn welcome_message(visitor_name: &str) -> String {
    format!("Halo {visitor_name}! 👋 Saya asisten virtual Valpro. Ada yang bisa saya bantu hari ini?")
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub session: Session,
    /// An open session already existed for the visitor.
    pub resumed: bool,
}

#[derive(Debug, Clone)]
pub struct HandoverOutcome {
    pub session: Session,
    pub admin_online: bool,
    /// `false` when the session was already queued or live.
    pub queued_now: bool,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub session: Session,
    /// Claimant replaced by this claim, if it was someone else.
    pub previous: Option<Claimant>,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn ChatEngine>,
    presence: Arc<PresenceRoster>,
    create_lock: Mutex<()>,
    history_limit: u32,
    context_window: u32,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        engine: Arc<dyn ChatEngine>,
        presence: Arc<PresenceRoster>,
        config: &SessionsConfig,
    ) -> Self {
        Self {
            store,
            engine,
            presence,
            create_lock: Mutex::new(()),
            history_limit: config.history_limit.max(1),
            context_window: config.context_window,
        }
    }

    pub fn history_limit(&self) -> u32 {
        self.history_limit
    }

    /// Start a session, or return the visitor's open one.
    pub async fn create_session(&self, new: NewSession) -> Result<CreateOutcome> {
        if new.visitor_id.trim().is_empty() {
            return Err(Error::invalid_input("visitorId is required"));
        }
        let _guard = self.create_lock.lock().await;

        if let Some(session) = self.store.find_open_session(&new.visitor_id).await? {
            debug!(session_id = %session.id, visitor_id = %new.visitor_id, "session resumed");
            return Ok(CreateOutcome {
                session,
                resumed: true,
            });
        }

        let now = Utc::now();
        let location = new
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        let session = Session {
            id: new_session_id(),
            visitor_id: new.visitor_id,
            visitor_name: new.visitor_name,
            visitor_email: new.visitor_email.filter(|v| !v.is_empty()),
            visitor_phone: new.visitor_phone.filter(|v| !v.is_empty()),
            current_page: new.current_page.filter(|v| !v.is_empty()),
            location,
            status: SessionStatus::Bot,
            claimed_by: None,
            claimed_by_name: None,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        };

        match self.store.insert_session(&session).await {
            Ok(()) => {},
            Err(relaydesk_sessions::Error::DuplicateOpen { visitor_id }) => {
                // Another process won the race; the store still holds one open session.
                let existing = self
                    .store
                    .find_open_session(&visitor_id)
                    .await?
                    .ok_or_else(|| Error::not_found(&visitor_id))?;
                return Ok(CreateOutcome {
                    session: existing,
                    resumed: true,
                });
            },
            Err(e) => return Err(e.into()),
        }
        info!(session_id = %session.id, visitor = %session.visitor_name, "chat session started");

        let welcome = ChatMessage::new(
            &session.id,
            Sender::Bot,
            welcome_message(&session.visitor_name),
            now,
        );
        if let Err(e) = self.store.append_message(&welcome).await {
            warn!(session_id = %session.id, error = %e, "failed to store welcome message");
        }

        Ok(CreateOutcome {
            session,
            resumed: false,
        })
    }

    /// Any session, closed ones included.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| Error::not_found(id))
    }

    /// A session that still accepts operations.
    pub async fn open_session(&self, id: &str) -> Result<Session> {
        match self.store.get_session(id).await? {
            Some(session) if session.status.is_open() => Ok(session),
            _ => Err(Error::not_found(id)),
        }
    }

    pub async fn request_handover(&self, id: &str) -> Result<HandoverOutcome> {
        let session = self.open_session(id).await?;
        let admin_online = self.presence.any_online();
        if session.status != SessionStatus::Bot {
            return Ok(HandoverOutcome {
                session,
                admin_online,
                queued_now: false,
            });
        }

        match self
            .store
            .transition(id, &[SessionStatus::Bot], SessionStatus::Queued, None, Utc::now())
            .await?
        {
            Some(session) => {
                info!(session_id = %id, admin_online, "handover requested");
                Ok(HandoverOutcome {
                    session,
                    admin_online,
                    queued_now: true,
                })
            },
            // Lost a race with another transition; report what won.
            None => Ok(HandoverOutcome {
                session: self.open_session(id).await?,
                admin_online,
                queued_now: false,
            }),
        }
    }

    /// Claim a queued session, or take over a live one. The last claim wins.
    pub async fn claim_session(&self, id: &str, claimant: Claimant) -> Result<ClaimOutcome> {
        let current = self.open_session(id).await?;
        if current.status == SessionStatus::Bot {
            return Err(Error::invalid_transition("claim", current.status));
        }
        let previous = current
            .claimant()
            .filter(|c| c.admin_id != claimant.admin_id);

        let Some(session) = self
            .store
            .transition(
                id,
                &[SessionStatus::Queued, SessionStatus::Live],
                SessionStatus::Live,
                Some(&claimant),
                Utc::now(),
            )
            .await?
        else {
            let now = self.open_session(id).await?;
            return Err(Error::invalid_transition("claim", now.status));
        };

        match &previous {
            Some(prev) => info!(
                session_id = %id,
                admin_id = %claimant.admin_id,
                previous_admin_id = %prev.admin_id,
                "session re-claimed"
            ),
            None => info!(session_id = %id, admin_id = %claimant.admin_id, "session claimed"),
        }
        Ok(ClaimOutcome { session, previous })
    }

    pub async fn return_to_bot(&self, id: &str) -> Result<Session> {
        let session = self
            .store
            .transition(id, &SessionStatus::OPEN, SessionStatus::Bot, None, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found(id))?;
        info!(session_id = %id, "session returned to bot");
        Ok(session)
    }

    pub async fn close_session(&self, id: &str) -> Result<Session> {
        let session = self
            .store
            .transition(id, &SessionStatus::OPEN, SessionStatus::Closed, None, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found(id))?;
        info!(session_id = %id, "session closed");
        Ok(session)
    }

    /// Close open sessions idle for longer than `max_idle`.
    pub async fn cleanup_inactive_sessions(&self, max_idle: Duration) -> Result<Vec<String>> {
        let now = Utc::now();
        let idle = chrono::Duration::from_std(max_idle)
            .map_err(|e| Error::invalid_input(format!("max idle out of range: {e}")))?;
        let closed = self.store.close_idle(now - idle, now).await?;
        if !closed.is_empty() {
            info!(count = closed.len(), "closed inactive sessions");
        }
        Ok(closed)
    }

    /// Append a message to an open session and refresh its activity time.
    pub async fn save_message(
        &self,
        session_id: &str,
        sender: Sender,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        self.open_session(session_id).await?;
        let message = ChatMessage::new(session_id, sender, content, at);
        self.store.append_message(&message).await?;
        if let Err(e) = self.store.touch(session_id, at).await {
            warn!(session_id, error = %e, "failed to refresh session activity");
        }
        Ok(message)
    }

    /// Bot turn for a session in bot status. `content` must already be saved
    /// as the visitor's message.
    pub async fn process_message(&self, session_id: &str, content: &str) -> Result<EngineReply> {
        let session = self.open_session(session_id).await?;
        if session.status != SessionStatus::Bot {
            return Err(Error::invalid_transition("process a bot turn for", session.status));
        }

        let mut history = self
            .store
            .messages(session_id, self.context_window.saturating_add(1))
            .await
            .unwrap_or_else(|e| {
                warn!(session_id, error = %e, "failed to load context, replying without it");
                Vec::new()
            });
        if history
            .last()
            .is_some_and(|m| m.sender == Sender::Visitor && m.content == content)
        {
            history.pop();
        }
        let start = history
            .len()
            .saturating_sub(usize::try_from(self.context_window).unwrap_or(usize::MAX));

        let reply = match self.engine.reply(&history[start..], content).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id, engine = self.engine.name(), error = %e, "chat engine failed, using canned reply");
                EngineReply {
                    suggest_handover: true,
                    ..ScriptedEngine::canned_reply(content)
                }
            },
        };

        let bot = ChatMessage::new(session_id, Sender::Bot, &reply.reply, Utc::now());
        if let Err(e) = self.store.append_message(&bot).await {
            warn!(session_id, error = %e, "failed to store bot reply");
        }
        Ok(reply)
    }

    /// History in chronological order. Readable after close.
    pub async fn messages(&self, session_id: &str, limit: Option<u32>) -> Result<Vec<ChatMessage>> {
        let limit = limit.unwrap_or(self.history_limit).clamp(1, self.history_limit);
        Ok(self.store.messages(session_id, limit).await?)
    }

    pub async fn queued_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.store.list_by_status(SessionStatus::Queued).await?)
    }

    pub async fn update_current_page(&self, session_id: &str, page: &str) -> Result<bool> {
        Ok(self
            .store
            .set_current_page(session_id, page, Utc::now())
            .await?)
    }

    /// Conversation summary for the admin picking the session up.
    pub async fn summary(&self, session_id: &str) -> String {
        let history = match self.store.messages(session_id, self.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id, error = %e, "failed to load history for summary");
                return ScriptedEngine::plain_summary(&[]);
            },
        };
        match self.engine.summarize(&history).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => ScriptedEngine::plain_summary(&history),
            Err(e) => {
                warn!(session_id, error = %e, "summary failed, using plain summary");
                ScriptedEngine::plain_summary(&history)
            },
        }
    }

    pub fn update_admin_status(
        &self,
        admin_id: &str,
        admin_name: &str,
        status: PresenceStatus,
    ) -> AdminPresence {
        let presence = self.presence.update(admin_id, admin_name, status);
        info!(admin_id, status = ?status, "admin presence updated");
        presence
    }

    pub fn online_admins(&self) -> Vec<AdminPresence> {
        self.presence.online()
    }
}
