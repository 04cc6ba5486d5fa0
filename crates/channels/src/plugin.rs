use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::error::Result;

// ── Events ──────────────────────────────────────────────────────────────────

/// Media class of an inbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Document,
    Audio,
    Video,
    Sticker,
}

/// A message received by one messaging client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundMessage {
    pub id: String,
    /// Sender identifier (`user@server`, possibly opaque).
    pub from: String,
    pub to: String,
    /// Conversation to reply into.
    pub chat_id: String,
    pub chat_name: Option<String>,
    /// Text body; media messages carry `[Image] caption` style text.
    pub body: String,
    /// Text of the message this one replies to, if any.
    pub quoted_body: Option<String>,
    /// Unix seconds as reported by the network.
    pub timestamp: i64,
    pub from_me: bool,
    pub has_media: bool,
    pub kind: MessageKind,
}

impl InboundMessage {
    /// Network timestamp, falling back to `now` when absent or out of range.
    #[must_use]
    pub fn received_at(&self) -> chrono::DateTime<chrono::Utc> {
        (self.timestamp > 0)
            .then(|| chrono::DateTime::from_timestamp(self.timestamp, 0))
            .flatten()
            .unwrap_or_else(chrono::Utc::now)
    }
}

/// Everything a messaging client reports, as one tagged union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagingEvent {
    Message(InboundMessage),
    Connected,
    Disconnected {
        reason: String,
    },
    LoggedOut,
    StreamReplaced,
    #[serde(rename_all = "camelCase")]
    LabelEdit {
        label_id: String,
        name: String,
        #[serde(default)]
        deleted: bool,
    },
    #[serde(rename_all = "camelCase")]
    LabelAssociation {
        label_id: String,
        jid: String,
        labeled: bool,
    },
}

impl MessagingEvent {
    /// Short tag for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::LoggedOut => "logged_out",
            Self::StreamReplaced => "stream_replaced",
            Self::LabelEdit { .. } => "label_edit",
            Self::LabelAssociation { .. } => "label_association",
        }
    }
}

/// Receiver of messaging events; the gateway provides the implementation.
#[async_trait]
pub trait MessagingEventSink: Send + Sync {
    async fn handle_event(&self, client_id: &str, event: MessagingEvent);
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Send text through a messaging client.
#[async_trait]
pub trait MessagingOutbound: Send + Sync {
    async fn send_text(&self, client_id: &str, to: &str, text: &str) -> Result<()>;

    /// Whether the client is connected and able to send.
    fn is_ready(&self, client_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn message_event_wire_shape() {
        let event: MessagingEvent = serde_json::from_value(serde_json::json!({
            "type": "message",
            "id": "ABC",
            "from": "99887766554433@lid",
            "chatId": "99887766554433@lid",
            "body": "/selesai",
            "quotedBody": "ID: #abcd1234efgh5678ijkl",
            "timestamp": 1_700_000_000,
            "kind": "text"
        }))
        .unwrap();
        let MessagingEvent::Message(msg) = event else {
            panic!("expected message");
        };
        assert_eq!(msg.quoted_body.as_deref(), Some("ID: #abcd1234efgh5678ijkl"));
        assert!(!msg.from_me);
        assert_eq!(msg.received_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn label_events_use_camel_case_fields() {
        let event: MessagingEvent = serde_json::from_value(serde_json::json!({
            "type": "label_association",
            "labelId": "3",
            "jid": "62811@s.whatsapp.net",
            "labeled": true
        }))
        .unwrap();
        assert_eq!(event.kind(), "label_association");
    }

    #[test]
    fn missing_timestamp_falls_back_to_now() {
        let msg = InboundMessage::default();
        let age = chrono::Utc::now() - msg.received_at();
        assert!(age.num_seconds() < 5);
    }
}
