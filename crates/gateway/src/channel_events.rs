use std::sync::Arc;

use {
    async_trait::async_trait,
    relaydesk_channels::{InboundMessage, MessagingEvent, MessagingEventSink},
    tracing::{debug, info, warn},
};

use crate::state::GatewayState;

/// Routes messaging client events into the gateway.
pub struct GatewayEventSink {
    state: Arc<GatewayState>,
}

impl GatewayEventSink {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl MessagingEventSink for GatewayEventSink {
    async fn handle_event(&self, client_id: &str, event: MessagingEvent) {
        match event {
            MessagingEvent::Message(msg) => {
                if client_id == self.state.messaging.leads_client_id {
                    debug!(client_id, from = %msg.from, "ignoring message on leads client");
                    return;
                }
                let state = Arc::clone(&self.state);
                let client_id = client_id.to_string();
                tokio::spawn(async move { handle_message(&state, &client_id, &msg).await });
            },
            MessagingEvent::LabelEdit {
                label_id,
                name,
                deleted,
            } => {
                if deleted {
                    self.state.labels.delete_label(&label_id);
                } else {
                    self.state.labels.set_label(&label_id, &name);
                }
                debug!(client_id, label_id = %label_id, deleted, "label updated");
            },
            MessagingEvent::LabelAssociation {
                label_id,
                jid,
                labeled,
            } => {
                if labeled {
                    self.state.labels.add_association(&label_id, &jid);
                } else {
                    self.state.labels.remove_association(&label_id, &jid);
                }
            },
            event @ (MessagingEvent::Connected
            | MessagingEvent::Disconnected { .. }
            | MessagingEvent::LoggedOut
            | MessagingEvent::StreamReplaced) => {
                self.state.registry.apply(client_id, &event);
                info!(client_id, event = event.kind(), "messaging client connection event");
                self.state.monitor.connection_event(client_id, &event).await;
            },
        }
    }
}

/// Reply bridge and auto-responder, run side by side.
async fn handle_message(state: &GatewayState, client_id: &str, msg: &InboundMessage) {
    let (bridged, replied) = tokio::join!(
        state.bridge.handle(msg),
        state.auto_reply.handle(client_id, msg),
    );
    match bridged {
        Ok(outcome) => debug!(client_id, message_id = %msg.id, ?outcome, "bridge handled message"),
        Err(e) => warn!(client_id, message_id = %msg.id, error = %e, "bridge failed"),
    }
    if let Err(e) = replied {
        warn!(client_id, message_id = %msg.id, error = %e, "auto-reply failed");
    }
}
