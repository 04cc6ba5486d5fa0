use std::{collections::HashMap, sync::RwLock};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::info,
};

use crate::plugin::MessagingEvent;

/// Connection status of one messaging client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub ready: bool,
    /// Why the client is not ready (`disconnected`, `logged_out`, ...).
    pub reason: Option<String>,
    pub since: DateTime<Utc>,
}

/// Per-client readiness, fed by connection events.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<String, ConnectionState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, client_id: &str, ready: bool, reason: Option<&str>) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let changed = clients.get(client_id).is_none_or(|s| s.ready != ready);
        clients.insert(client_id.to_string(), ConnectionState {
            ready,
            reason: reason.map(String::from),
            since: Utc::now(),
        });
        if changed {
            info!(client_id, ready, reason, "messaging client state changed");
        }
    }

    /// Apply a connection event. Returns `false` for non-connection events.
    pub fn apply(&self, client_id: &str, event: &MessagingEvent) -> bool {
        match event {
            MessagingEvent::Connected => self.set_ready(client_id, true, None),
            MessagingEvent::Disconnected { reason } => {
                let reason = if reason.is_empty() {
                    "disconnected"
                } else {
                    reason.as_str()
                };
                self.set_ready(client_id, false, Some(reason));
            },
            MessagingEvent::LoggedOut => self.set_ready(client_id, false, Some("logged_out")),
            MessagingEvent::StreamReplaced => {
                self.set_ready(client_id, false, Some("stream_replaced"));
            },
            MessagingEvent::Message(_)
            | MessagingEvent::LabelEdit { .. }
            | MessagingEvent::LabelAssociation { .. } => return false,
        }
        true
    }

    pub fn is_ready(&self, client_id: &str) -> bool {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_id)
            .is_some_and(|s| s.ready)
    }

    pub fn snapshot(&self) -> HashMap<String, ConnectionState> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
