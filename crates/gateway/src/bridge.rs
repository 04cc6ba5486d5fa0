//! Agent replies from the messaging network back into web sessions.
//!
//! An agent answers by quoting a forwarded message; the session token at the
//! end of the quote names the session. Knowing a live token is the only
//! authorization this path has.

use std::sync::Arc;

use {
    relaydesk_channels::InboundMessage,
    relaydesk_sessions::{ChatMessage, Claimant, Sender, SessionStatus, extract_session_id},
    serde_json::json,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    hub::{Hub, event},
    session::SessionManager,
};

pub const WHATSAPP_ADMIN_ID: &str = "admin_wa";
pub const WHATSAPP_ADMIN_NAME: &str = "WhatsApp Admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    Greeting,
    Thanks,
    Close,
    ReturnToBot,
}

impl BridgeCommand {
    pub fn parse(body: &str) -> Option<Self> {
        match body.trim().to_lowercase().as_str() {
            "/hi" | "/halo" | "/sambutan" => Some(Self::Greeting),
            "/thanks" | "/trims" | "/tq" => Some(Self::Thanks),
            "/end" | "/close" | "/selesai" => Some(Self::Close),
            "/ai" | "/bot" | "/kembali" => Some(Self::ReturnToBot),
            _ => None,
        }
    }
}

pub fn greeting_text(visitor_name: &str) -> String {
    let name = match visitor_name.trim() {
        "" => "Kak",
        name => name,
    };
    format!("Halo {name}! 👋 Perkenalkan saya Admin dari Valpro. Ada yang bisa saya bantu terkait layanan kami?")
}

pub const THANKS_TEXT: &str = "Terima kasih telah menghubungi Valpro. Jangan ragu untuk menghubungi kami kembali jika ada pertanyaan lain! 🙏";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    FromMe,
    NotAReply,
    NoToken,
    UnknownSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Ignored(Ignored),
    Closed { session_id: String },
    ReturnedToBot { session_id: String },
    Delivered { session_id: String, claimed: bool },
}

pub struct ReplyBridge {
    sessions: Arc<SessionManager>,
    hub: Hub,
}

impl ReplyBridge {
    pub fn new(sessions: Arc<SessionManager>, hub: Hub) -> Self {
        Self { sessions, hub }
    }

    pub async fn handle(&self, msg: &InboundMessage) -> Result<BridgeOutcome> {
        if msg.from_me {
            return Ok(BridgeOutcome::Ignored(Ignored::FromMe));
        }
        let Some(quoted) = msg.quoted_body.as_deref().filter(|q| !q.trim().is_empty()) else {
            return Ok(BridgeOutcome::Ignored(Ignored::NotAReply));
        };
        let Some(session_id) = extract_session_id(quoted) else {
            debug!(from = %msg.from, "quoted reply carries no session token");
            return Ok(BridgeOutcome::Ignored(Ignored::NoToken));
        };
        let session = match self.sessions.open_session(&session_id).await {
            Ok(session) => session,
            Err(e) if e.kind() == relaydesk_common::ErrorKind::NotFound => {
                debug!(session_id = %session_id, from = %msg.from, "reply for unknown or closed session");
                return Ok(BridgeOutcome::Ignored(Ignored::UnknownSession));
            },
            Err(e) => return Err(e),
        };
        info!(
            session_id = %session_id,
            from = %msg.from,
            sent_at = %msg.received_at(),
            "agent reply received"
        );

        let text = match BridgeCommand::parse(&msg.body) {
            Some(BridgeCommand::Greeting) => greeting_text(&session.visitor_name),
            Some(BridgeCommand::Thanks) => THANKS_TEXT.to_string(),
            Some(BridgeCommand::Close) => {
                self.sessions.close_session(&session_id).await?;
                self.hub.to_session(&session_id, event::SESSION_CLOSED, json!({}));
                self.hub.to_admins(
                    event::QUEUE_UPDATE,
                    json!({ "type": "closed", "sessionId": session_id }),
                );
                return Ok(BridgeOutcome::Closed { session_id });
            },
            Some(BridgeCommand::ReturnToBot) => {
                self.sessions.return_to_bot(&session_id).await?;
                self.hub
                    .to_session(&session_id, event::STATUS_CHANGE, json!({ "status": "bot" }));
                self.hub.to_admins(
                    event::QUEUE_UPDATE,
                    json!({ "type": "bot_handoff", "sessionId": session_id }),
                );
                return Ok(BridgeOutcome::ReturnedToBot { session_id });
            },
            None => msg.body.clone(),
        };

        // Network timestamps are whole seconds and may lag; history order
        // follows arrival here.
        let at = chrono::Utc::now();
        let message = match self
            .sessions
            .save_message(&session_id, Sender::Admin, &text, at)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to store agent reply, delivering anyway");
                ChatMessage::new(&session_id, Sender::Admin, &text, at)
            },
        };

        self.hub.to_session(
            &session_id,
            event::CHAT_MESSAGE,
            json!({
                "sessionId": session_id,
                "content": message.content,
                "sender": "admin",
                "timestamp": message.timestamp,
            }),
        );
        self.hub.to_admins(
            event::CHAT_MESSAGE,
            json!({
                "id": message.id,
                "sessionId": session_id,
                "content": message.content,
                "sender": "admin",
                "timestamp": message.timestamp,
                "via": "whatsapp",
            }),
        );

        let mut claimed = false;
        if session.status == SessionStatus::Queued {
            match self
                .sessions
                .claim_session(
                    &session_id,
                    Claimant::new(WHATSAPP_ADMIN_ID, WHATSAPP_ADMIN_NAME),
                )
                .await
            {
                Ok(_) => {
                    claimed = true;
                    self.hub.to_session(
                        &session_id,
                        event::ADMIN_JOINED,
                        json!({ "adminName": WHATSAPP_ADMIN_NAME }),
                    );
                    self.hub.to_admins(
                        event::QUEUE_UPDATE,
                        json!({
                            "type": "claimed",
                            "sessionId": session_id,
                            "adminId": WHATSAPP_ADMIN_ID,
                        }),
                    );
                },
                Err(e) => warn!(session_id = %session_id, error = %e, "auto-claim failed"),
            }
        }

        Ok(BridgeOutcome::Delivered {
            session_id,
            claimed,
        })
    }
}
