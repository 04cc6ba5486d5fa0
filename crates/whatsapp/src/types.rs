//! Wire protocol between the gateway and the messaging sidecar.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sidecar → gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Connected {
        account_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        account_id: String,
        #[serde(default)]
        reason: String,
    },
    LoggedOut {
        account_id: String,
    },
    StreamReplaced {
        account_id: String,
    },
    InboundMessage {
        account_id: String,
        message_id: String,
        chat_jid: String,
        #[serde(default)]
        chat_name: Option<String>,
        sender_jid: String,
        #[serde(default)]
        to_jid: String,
        #[serde(default)]
        body: String,
        /// `image`, `document`, `audio`, `video`, `sticker`; absent for text.
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        quoted_body: Option<String>,
        #[serde(default)]
        timestamp: i64,
        #[serde(default)]
        from_me: bool,
    },
    LabelEdit {
        account_id: String,
        label_id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        deleted: bool,
    },
    LabelAssociation {
        account_id: String,
        label_id: String,
        jid: String,
        labeled: bool,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    LookupResult {
        request_id: String,
        success: bool,
        /// Opaque user id → canonical phone id.
        #[serde(default)]
        mappings: HashMap<String, String>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        account_id: Option<String>,
        error: String,
    },
}

impl SidecarMessage {
    /// Correlation id of a response to a gateway request.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::SendResult { request_id, .. } | Self::LookupResult { request_id, .. } => {
                Some(request_id)
            },
            _ => None,
        }
    }
}

/// Gateway → sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    SendText {
        request_id: String,
        account_id: String,
        to: String,
        text: String,
    },
    LookupContacts {
        request_id: String,
        account_id: String,
        ids: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_inbound_with_defaults() {
        let msg: SidecarMessage = serde_json::from_str(
            r#"{"type":"inbound_message","account_id":"bot","message_id":"m1",
                "chat_jid":"62811@s.whatsapp.net","sender_jid":"62811@s.whatsapp.net",
                "body":"halo"}"#,
        )
        .unwrap();
        let SidecarMessage::InboundMessage {
            from_me,
            quoted_body,
            media_type,
            ..
        } = msg
        else {
            panic!("expected inbound");
        };
        assert!(!from_me);
        assert!(quoted_body.is_none());
        assert!(media_type.is_none());
    }

    #[test]
    fn responses_expose_request_id() {
        let msg: SidecarMessage = serde_json::from_str(
            r#"{"type":"lookup_result","request_id":"r1","success":true,"mappings":{"1":"62"}}"#,
        )
        .unwrap();
        assert_eq!(msg.request_id(), Some("r1"));
    }

    #[test]
    fn gateway_send_serializes_tagged() {
        let json = serde_json::to_value(GatewayMessage::SendText {
            request_id: "r".into(),
            account_id: "bot".into(),
            to: "62811@s.whatsapp.net".into(),
            text: "hi".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "send_text");
        assert_eq!(json["to"], "62811@s.whatsapp.net");
    }
}
