//! Messaging client backed by the WhatsApp sidecar.

use std::{sync::Arc, time::Duration};

use {
    relaydesk_channels::{
        ConnectionRegistry, InboundMessage, MessageKind, MessagingEvent, MessagingEventSink,
    },
    tokio::sync::{RwLock, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    outbound::{SharedHandle, WhatsAppOutbound},
    sidecar::{MessageCallback, connect_with_retry},
    types::SidecarMessage,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_ATTEMPTS: u32 = 5;

/// Keeps a sidecar connection alive and turns its frames into
/// [`MessagingEvent`]s.
pub struct WhatsAppClient {
    url: String,
    request_timeout: Duration,
    sidecar: SharedHandle,
    registry: Arc<ConnectionRegistry>,
    outbound: WhatsAppOutbound,
}

impl WhatsAppClient {
    pub fn new(
        url: impl Into<String>,
        request_timeout: Duration,
        registry: Arc<ConnectionRegistry>,
        lookup_client_id: impl Into<String>,
    ) -> Self {
        let sidecar: SharedHandle = Arc::new(RwLock::new(None));
        let outbound =
            WhatsAppOutbound::new(Arc::clone(&sidecar), Arc::clone(&registry), lookup_client_id);
        Self {
            url: url.into(),
            request_timeout,
            sidecar,
            registry,
            outbound,
        }
    }

    /// Outbound adapter sharing this client's connection.
    pub fn outbound(&self) -> Arc<WhatsAppOutbound> {
        Arc::new(self.outbound.clone())
    }

    /// Maintain the sidecar connection and deliver events to `sink`, in
    /// arrival order, until `cancel` fires.
    pub async fn run(self, sink: Arc<dyn MessagingEventSink>, cancel: CancellationToken) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<(String, MessagingEvent)>();

        let dispatch_cancel = cancel.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatch_cancel.cancelled() => break,
                    next = events_rx.recv() => {
                        let Some((client_id, event)) = next else { break };
                        sink.handle_event(&client_id, event).await;
                    }
                }
            }
        });

        let callback_tx = events_tx.clone();
        let callback: MessageCallback = Arc::new(move |msg| {
            if let Some(event) = to_event(msg) {
                let _ = callback_tx.send(event);
            }
        });

        while !cancel.is_cancelled() {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = connect_with_retry(&self.url, Arc::clone(&callback), self.request_timeout, CONNECT_ATTEMPTS) => res,
            };
            let disconnected = match connected {
                Ok((handle, disconnected)) => {
                    *self.sidecar.write().await = Some(handle);
                    disconnected
                },
                Err(e) => {
                    warn!(url = %self.url, error = %e, "messaging sidecar unreachable");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = disconnected => {},
            }
            *self.sidecar.write().await = None;
            for (client_id, state) in self.registry.snapshot() {
                if state.ready {
                    let _ = events_tx.send((client_id, MessagingEvent::Disconnected {
                        reason: "sidecar_lost".into(),
                    }));
                }
            }
            warn!(url = %self.url, "messaging sidecar connection lost, reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {},
            }
        }

        *self.sidecar.write().await = None;
        dispatcher.abort();
        info!("messaging client stopped");
    }
}

/// Translate an unsolicited sidecar frame into a client event.
pub fn to_event(msg: SidecarMessage) -> Option<(String, MessagingEvent)> {
    let event = match msg {
        SidecarMessage::Connected {
            account_id,
            phone_number,
        } => {
            info!(account_id, ?phone_number, "whatsapp connected");
            (account_id, MessagingEvent::Connected)
        },
        SidecarMessage::Disconnected { account_id, reason } => {
            warn!(account_id, reason, "whatsapp disconnected");
            (account_id, MessagingEvent::Disconnected { reason })
        },
        SidecarMessage::LoggedOut { account_id } => (account_id, MessagingEvent::LoggedOut),
        SidecarMessage::StreamReplaced { account_id } => {
            (account_id, MessagingEvent::StreamReplaced)
        },
        SidecarMessage::InboundMessage {
            account_id,
            message_id,
            chat_jid,
            chat_name,
            sender_jid,
            to_jid,
            body,
            media_type,
            file_name,
            quoted_body,
            timestamp,
            from_me,
        } => {
            let kind = media_kind(media_type.as_deref());
            let message = InboundMessage {
                id: message_id,
                from: sender_jid,
                to: to_jid,
                chat_id: chat_jid,
                chat_name,
                body: describe_body(kind, &body, file_name.as_deref()),
                quoted_body: quoted_body.filter(|q| !q.trim().is_empty()),
                timestamp,
                from_me,
                has_media: kind != MessageKind::Text,
                kind,
            };
            debug!(account_id, from = %message.from, kind = ?kind, "inbound message");
            (account_id, MessagingEvent::Message(message))
        },
        SidecarMessage::LabelEdit {
            account_id,
            label_id,
            name,
            deleted,
        } => (account_id, MessagingEvent::LabelEdit {
            label_id,
            name,
            deleted,
        }),
        SidecarMessage::LabelAssociation {
            account_id,
            label_id,
            jid,
            labeled,
        } => (account_id, MessagingEvent::LabelAssociation {
            label_id,
            jid,
            labeled,
        }),
        SidecarMessage::SendResult { request_id, .. }
        | SidecarMessage::LookupResult { request_id, .. } => {
            debug!(request_id, "late sidecar response dropped");
            return None;
        },
        SidecarMessage::Error { account_id, error } => {
            warn!(?account_id, error, "sidecar error");
            return None;
        },
    };
    Some(event)
}

fn media_kind(media_type: Option<&str>) -> MessageKind {
    match media_type.map(str::to_ascii_lowercase).as_deref() {
        Some("image") => MessageKind::Image,
        Some("document") => MessageKind::Document,
        Some("audio" | "ptt") => MessageKind::Audio,
        Some("video") => MessageKind::Video,
        Some("sticker") => MessageKind::Sticker,
        _ => MessageKind::Text,
    }
}

/// Text shown for a message: media gets a `[Kind]` prefix.
fn describe_body(kind: MessageKind, body: &str, file_name: Option<&str>) -> String {
    let body = body.trim();
    let with_caption = |label: &str, caption: &str| {
        if caption.is_empty() {
            format!("[{label}]")
        } else {
            format!("[{label}] {caption}")
        }
    };
    match kind {
        MessageKind::Text => body.to_string(),
        MessageKind::Image => with_caption("Image", body),
        MessageKind::Video => with_caption("Video", body),
        MessageKind::Document => with_caption("Document", file_name.unwrap_or(body).trim()),
        MessageKind::Audio => "[Audio]".to_string(),
        MessageKind::Sticker => "[Sticker]".to_string(),
    }
}
